//! Example demonstrating a custom protocol.
//!
//! `InventoryProtocol` simulates a remote inventory service: hosts named
//! `down` refuse connections, `slow` hosts never answer in time and `busy`
//! hosts fail half-way through. The example shows which failures fail over
//! on their own and how `CallConfig` forces fail-over for the rest.
//!
//! Run with: `cargo run --example custom_protocol`

use callover::{
    AttemptFailure, CallConfig, CallProtocol, CallRequest, Descriptor, Error, GroupDescriptor,
    GroupPolicy, ServiceCaller, TargetDescriptor,
};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
struct StockQuery {
    sku: String,
    config: Arc<CallConfig>,
}

impl CallRequest for StockQuery {
    fn describe(&self) -> String {
        format!("stock query for {} [{}]", self.sku, self.config)
    }

    fn is_fail_over_allowed(&self) -> bool {
        self.config.is_fail_over_allowed()
    }
}

struct InventoryProtocol;

impl CallProtocol for InventoryProtocol {
    type Request = StockQuery;
    type Output = u32;

    fn supports_protocol(&self, protocol: &str) -> bool {
        protocol == "inventory"
    }

    async fn attempt(
        &self,
        target: &TargetDescriptor,
        request: &StockQuery,
    ) -> Result<u32, AttemptFailure> {
        let host = target
            .url()
            .trim_start_matches("inventory://")
            .split('.')
            .next()
            .unwrap_or_default();

        match host {
            "down" => Err(AttemptFailure::connection_refused()),
            "slow" => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(0)
            }
            "busy" => Err(AttemptFailure::io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            ))),
            _ => Ok(request.sku.len() as u32 * 7),
        }
    }
}

fn target(url: &str) -> Result<Descriptor, Error> {
    Ok(TargetDescriptor::new(url, 300)?.into())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("callover=info")
        .init();

    let descriptor = GroupDescriptor::new(
        GroupPolicy::Ordered,
        vec![
            target("inventory://down.example.com")?,
            target("inventory://busy.example.com")?,
            target("inventory://slow.example.com")?,
            target("inventory://stock.example.com")?,
        ],
    )?;
    let caller = ServiceCaller::new(descriptor, InventoryProtocol)?;

    println!("=== Default fail-over ===");
    let config = Arc::new(CallConfig::new());
    let query = StockQuery {
        sku: "WIDGET-42".to_string(),
        config: Arc::clone(&config),
    };
    match caller.call(Arc::new(query)).await {
        Ok(result) => println!("In stock: {}", result.data()),
        Err(Error::CallFailed { exceptions, .. }) => {
            println!("Gave up after {} attempt(s):", exceptions.len());
            for exception in exceptions.iter() {
                println!("  {}", exception);
            }
        }
        Err(e) => return Err(e.into()),
    }
    println!();

    println!("=== Fail-over allowed ===");
    config.set_fail_over_allowed(true);
    let query = StockQuery {
        sku: "WIDGET-42".to_string(),
        config,
    };
    let result = caller.call(Arc::new(query)).await?;
    println!(
        "In stock: {} (answered by {} after {} attempt(s))",
        result.data(),
        result.succeeded_target().url(),
        result.attempts()
    );
    for exception in result.exceptions() {
        println!("  earlier: {}", exception.short_reason());
    }

    Ok(())
}
