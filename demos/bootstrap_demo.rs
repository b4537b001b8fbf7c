/// Bootstrap and scenario walkthrough
///
/// Opens a fresh database, runs the bootstrap contract, creates a task,
/// wires up a live subscription and an onEnter automation, then shows both
/// reacting to a single mutation.
///
/// Run with: cargo run --example bootstrap_demo

use std::sync::{Arc, Mutex};

use supernode::prelude::*;
use supernode::query::{PropertyOp, QueryFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    println!("{}", "=".repeat(60));
    println!("Opening database (bootstrap runs automatically)");
    println!("{}", "=".repeat(60));

    let db = Arc::new(Database::open(DatabaseConfig::default()).await?);

    let item_supertag = db.nodes().resolve_system_id("supertag:item").await?;
    println!("#Item resolved to {item_supertag}");

    println!("\n{}", "=".repeat(60));
    println!("Creating an onEnter automation: tasks start active");
    println!("{}", "=".repeat(60));

    db.create_automation(AutomationDefinition {
            name: "activate new tasks".into(),
            enabled: true,
            trigger: Trigger::QueryMembership {
                query: QueryDefinition {
                    filters: vec![QueryFilter::Supertag {
                            supertag_system_id: "supertag:task".into(),
                            include_inherited: true,
                    }],
                    sort: None,
                    limit: None,
                },
                event: QueryMembershipEvent::OnEnter,
            },
            action: Action::SetProperty {
                field_system_id: "field:status".into(),
                value: ActionValue::Literal(PropertyValue::Text("active".into())),
            },
    })
        .await?;

    println!("\n{}", "=".repeat(60));
    println!("Subscribing to done tasks");
    println!("{}", "=".repeat(60));

    let notifications = Arc::new(Mutex::new(0usize));
    let notifications_cb = notifications.clone();
    let subscription = db
        .subscribe(
        QueryDefinition {
            filters: vec![
                QueryFilter::Supertag {
                    supertag_system_id: "supertag:task".into(),
                    include_inherited: true,
                },
                QueryFilter::Property {
                    field_system_id: "field:status".into(),
                    op: PropertyOp::Eq,
                    value: PropertyValue::Text("done".into()),
                },
            ],
            sort: None,
            limit: None,
        },
        Arc::new(move |change| {
                *notifications_cb.lock().unwrap() += 1;
                println!(
                    "subscription fired: added={} removed={} changed={} total={}",
                    change.added.len(),
                    change.removed.len(),
                    change.changed.len(),
                    change.total_count
                );
        }),
    )
        .await?;

    println!("\n{}", "=".repeat(60));
    println!("Creating a task");
    println!("{}", "=".repeat(60));

    let task = db
        .create_node(CreateNodeInput {
            content: Some("Write the quarterly report".into()),
            supertag: Some("supertag:task".into()),
            ..Default::default()
    })
        .await?;

    let node = db.find_node(task).await?.unwrap();
    let status_field = db.nodes().resolve_system_id("field:status").await?;
    println!(
        "task status after onEnter automation: {:?}",
        node.property(status_field)
    );

    println!("\n{}", "=".repeat(60));
    println!("Marking the task done");
    println!("{}", "=".repeat(60));

    db.set_property(task, "field:status", PropertyValue::Text("done".into()))
        .await?;

    println!("subscription callback fired {} time(s)", *notifications.lock().unwrap());
    println!(
        "subscription's last matching results: {}",
        subscription.last_results().await.len()
    );

    subscription.unsubscribe().await;
    Ok(())
}
