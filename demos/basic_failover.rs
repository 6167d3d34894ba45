//! Example demonstrating fail-over between HTTP targets.
//!
//! The first target points at a port nobody listens on, so the connection is
//! refused and the call fails over to the second target.
//!
//! Run with: `cargo run --example basic_failover`

use callover::{
    Descriptor, GroupDescriptor, GroupPolicy, HttpCallRequest, HttpMethod, HttpServiceCaller,
    SuccessfulStatus, TargetDescriptor,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Post {
    id: u32,
    title: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("callover=debug")
        .init();

    let descriptor: Descriptor = GroupDescriptor::new(
        GroupPolicy::Ordered,
        vec![
            TargetDescriptor::with_timeouts("http://localhost:1/posts/1", 5000, 1000, 4000)?.into(),
            TargetDescriptor::with_timeouts(
                "https://jsonplaceholder.typicode.com/posts/1",
                10_000,
                2000,
                8000,
            )?
            .into(),
        ],
    )?
    .into();

    let caller = HttpServiceCaller::new(descriptor)?;

    let request = HttpCallRequest::new()
        .with_method(HttpMethod::Get)
        .with_status_code_verifier(SuccessfulStatus);

    let result = caller.call(request).await?;

    println!("Succeeded at: {}", result.succeeded_target().url());
    println!("Attempts: {}", result.attempts());
    println!("Duration: {:?}", result.duration());
    for exception in result.exceptions() {
        println!("Earlier failure: {}", exception);
    }

    let post: Post = result.json()?;
    println!("Post: {:?}", post);

    Ok(())
}
