//! Shows the batch-mode hand-off contract: several sub-requests write
//! their envelopes onto one shared pipe, tagged by index, and an
//! aggregator reassembles out-of-order completions.

use bytes::Bytes;
use serde_json::json;
use tokio::sync::mpsc;
use wisp_web::{Request, Wire};

#[tokio::main]
async fn main() {
    let sub_requests = ["/users?limit=2", "/posts?limit=1", "/tags?ids=a&ids=b"];

    // the aggregator owns the channel; buffering is its contract
    let (tx, mut rx) = mpsc::channel::<Wire>(sub_requests.len());

    for (index, uri) in sub_requests.iter().enumerate() {
        let tx = tx.clone();
        let uri = uri.to_string();
        tokio::spawn(async move {
            let raw = http::Request::builder().uri(uri.as_str()).body(Bytes::new()).unwrap();
            let mut request = Request::new(raw).with_pipe(tx, index);

            let paginator = request.paginator().unwrap();
            request.write(&json!({"from": uri, "limit": paginator.limit})).await.unwrap();
        });
    }
    drop(tx);

    // completions arrive in any order; the index puts them back in place
    let mut combined: Vec<Option<Wire>> = vec![None; sub_requests.len()];
    while let Some(wire) = rx.recv().await {
        let index = wire.get("index").and_then(|v| v.as_u64()).unwrap() as usize;
        combined[index] = Some(wire);
    }

    for (index, slot) in combined.iter().enumerate() {
        let wire = slot.as_ref().unwrap();
        println!("{index}: {}", serde_json::to_string(&wire).unwrap());
    }
}
