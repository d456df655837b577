pub mod error;
pub mod export;
pub mod extraction;
pub mod gemini;
pub mod image;
pub mod models;
pub mod notify;
pub mod prompt;
pub mod routes;
pub mod session;

use worker::{Context, Env, Request, Response, Result, event};

#[event(fetch)]
async fn fetch(req: Request, env: Env, ctx: Context) -> Result<Response> {
    routes::handle(req, env, ctx).await
}
