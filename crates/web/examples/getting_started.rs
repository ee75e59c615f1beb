use std::error::Error;

use bytes::Bytes;
use http::Response;
use serde_json::json;
use wisp_http::handler::make_handler;
use wisp_web::{Config, Fault, Reply, Request, Server};

// curl -v 'http://127.0.0.1:8080/?skip=10&limit=5'
// curl -v --compressed -H 'Accept-Encoding: deflate' 'http://127.0.0.1:8080/?ids=a&ids=b'
async fn list_items(raw: http::Request<Bytes>) -> Result<Response<Bytes>, Box<dyn Error + Send + Sync>> {
    let mut request = Request::new(raw);

    let paginator = match request.paginator() {
        Ok(paginator) => paginator,
        Err(e) => return respond(request.raise(&Fault::from(e)).await?),
    };

    if !paginator.ids.is_empty() {
        return respond(request.write(&json!({"items": paginator.ids})).await?);
    }

    let items: Vec<i64> = (paginator.skip..).take(paginator.limit as usize).collect();
    respond(request.write(&json!({"items": items})).await?)
}

fn respond(reply: Reply) -> Result<Response<Bytes>, Box<dyn Error + Send + Sync>> {
    reply.into_response().ok_or_else(|| "piped reply outside batch mode".into())
}

#[tokio::main]
async fn main() {
    let config = Config::load().unwrap();

    let server = Server::builder()
        .address(config.listen)
        .handler(make_handler(list_items))
        .build()
        .unwrap();

    server.lifecycle().on_exit(|| println!("closing down"));

    if let Err(e) = server.serve().await {
        eprintln!("server error: {e}");
        std::process::exit(1);
    }
}
