use std::error::Error;
use std::net::SocketAddr;
use std::time::Duration;

use fiber_http::handler::make_handler;
use fiber_http::protocol::body::Body;
use fiber_http::server::{Server, ServerOptions};
use http::{Method, Request, Response, StatusCode};
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let options = ServerOptions::builder().backlog(1024).build()?;
    let server = match Server::builder().address(SocketAddr::from(([127, 0, 0, 1], 8080))).options(options).serve(make_handler(echo)) {
        Ok(server) => server,
        Err(e) => {
            error!(cause = %e, "bind server error");
            return Err(e.into());
        }
    };
    info!(address = %server.local_addr(), transport = %server.transport(), "start listening");

    tokio::signal::ctrl_c().await?;
    info!(connections = server.connections(), "shutting down");
    server.close();
    server.closed().await;
    Ok(())
}

/// `GET /count` streams a few lines, other `GET`s say hello, `POST` echoes the body.
async fn echo(request: Request<Body>) -> Result<Response<Body>, Box<dyn Error + Send + Sync>> {
    match (request.method(), request.uri().path()) {
        (&Method::GET, "/count") => {
            let (mut writer, body) = Body::channel(None);
            tokio::task::spawn_local(async move {
                for i in 0..5 {
                    if let Err(e) = writer.write(format!("{i}\n")).await {
                        warn!(cause = %e, "client went away");
                        return;
                    }
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
            });
            Ok(Response::new(body))
        }
        (&Method::GET, _) => Ok(Response::new(Body::from("Hello World!\r\n"))),
        (&Method::POST, _) => {
            let body = request.into_body().to_buf().await?;
            info!(size = body.len(), "echo request body");
            Ok(Response::new(Body::fixed(body)))
        }
        _ => Ok(Response::builder().status(StatusCode::METHOD_NOT_ALLOWED).body(Body::empty())?),
    }
}
