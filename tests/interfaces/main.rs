//! Interface tests for the broker contract using Cucumber.
//!
//! Scenarios describe what every broker must do. They run against the
//! in-memory broker and the broker registry.
//!
//! ```bash
//! cargo test --test interfaces --features test-utils
//! ```

mod steps;

use cucumber::World;
use steps::broker::BrokerWorld;
use steps::registry::RegistryWorld;

#[tokio::main]
async fn main() {
    // Run Broker tests
    println!("\n=== Running Broker Interface Tests ===\n");
    BrokerWorld::cucumber()
        .fail_on_skipped()
        .run("tests/interfaces/features/broker.feature")
        .await;

    // Run BrokerRegistry tests
    println!("\n=== Running BrokerRegistry Interface Tests ===\n");
    RegistryWorld::cucumber()
        .fail_on_skipped()
        .run("tests/interfaces/features/registry.feature")
        .await;
}
