use std::time::Instant;
use surf::middleware::{Middleware, Next};
use surf::{Client, Request, Response};

/// Surf middleware logging every request with its status and duration.
pub struct SurfLogging;

#[surf::utils::async_trait]
impl Middleware for SurfLogging {
    async fn handle(
        &self,
        req: Request,
        client: Client,
        next: Next<'_>,
    ) -> Result<Response, surf::Error> {
        let method = req.method();
        let url = req.url().clone();
        let start = Instant::now();

        log::debug!("-> {} {}", method, url);
        let response = next.run(req, client).await?;
        log::debug!(
            "<- {} {} {} ({:?})",
            method,
            url,
            response.status(),
            start.elapsed()
        );

        Ok(response)
    }
}
