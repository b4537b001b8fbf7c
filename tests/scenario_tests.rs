//! End-to-end scenarios exercising the whole stack (bootstrap through
//! automations) the way a caller using only [`supernode::prelude`] would.

use std::sync::{Arc, Mutex};

use supernode::prelude::*;
use supernode::query::{PropertyOp, QueryFilter};

async fn open() -> Arc<Database> {
    Arc::new(Database::open(DatabaseConfig::default()).await.unwrap())
}

fn status_filter(status: &str) -> QueryFilter {
    QueryFilter::Property {
        field_system_id: "field:status".into(),
        op: PropertyOp::Eq,
        value: PropertyValue::Text(status.into()),
    }
}

#[tokio::test]
async fn basic_filter_change_delivers_one_callback_on_match() {
    let db = open().await;
    let t1 = db
        .create_node(CreateNodeInput {
            content: Some("T1".into()),
            supertag: Some("supertag:task".into()),
            ..Default::default()
    })
        .await
        .unwrap();

    let definition = QueryDefinition {
        filters: vec![
            QueryFilter::Supertag {
                supertag_system_id: "supertag:task".into(),
                include_inherited: true,
            },
            status_filter("done"),
        ],
        sort: None,
        limit: None,
    };

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_cb = seen.clone();
    let handle = db
        .subscribe(
        definition,
        Arc::new(move |change| {
                seen_cb.lock().unwrap().push(change);
        }),
    )
        .await
        .unwrap();

    assert!(handle.last_results().await.is_empty());

    db.set_property(t1, "field:status", PropertyValue::Text("done".into()))
        .await
        .unwrap();

    let changes = seen.lock().unwrap().clone();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].added.iter().map(|n| n.id()).collect::<Vec<_>>(), vec![t1]);
    assert!(changes[0].removed.is_empty());
    assert!(changes[0].changed.is_empty());
    assert_eq!(changes[0].total_count, 1);
}

#[tokio::test]
async fn on_enter_automation_sets_status_active() {
    let db = open().await;

    db.create_automation(AutomationDefinition {
            name: "activate on task entry".into(),
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
        .await
        .unwrap();

    let n1 = db
        .create_node(CreateNodeInput {
            content: Some("N1".into()),
            supertag: Some("supertag:task".into()),
            ..Default::default()
    })
        .await
        .unwrap();

    let node = db.find_node(n1).await.unwrap().unwrap();
    let status_field = db.nodes().resolve_system_id("field:status").await.unwrap();
    assert_eq!(node.property(status_field), Some(&PropertyValue::Text("active".into())));
}

#[tokio::test]
async fn threshold_automation_fires_once() {
    let db = open().await;

    let computed_id = db
        .create_computed_field(
        Some("open task count".into()),
        ComputedFieldDefinition {
            aggregation: Aggregation::Count,
            query: QueryDefinition {
                filters: vec![status_filter("open")],
                sort: None,
                limit: None,
            },
            field_system_id: None,
        },
    )
        .await
        .unwrap();

    let target = db.create_node(CreateNodeInput::default()).await.unwrap();

    db.create_automation(AutomationDefinition {
            name: "alert on backlog".into(),
            enabled: true,
            trigger: Trigger::Threshold {
                computed_field_id: computed_id,
                condition: ThresholdCondition {
                    operator: ThresholdOperator::Gte,
                    value: 2.0,
                },
                fire_once: true,
                target_node_id: Some(target),
            },
            action: Action::SetProperty {
                field_system_id: "field:alerted".into(),
                value: ActionValue::Literal(PropertyValue::Bool(true)),
            },
    })
        .await
        .unwrap();

    for i in 0..3 {
        let n = db
            .create_node(CreateNodeInput {
                content: Some(format!("task-{i}")),
                supertag: Some("supertag:task".into()),
                ..Default::default()
        })
            .await
            .unwrap();
        db.set_property(n, "field:status", PropertyValue::Text("open".into()))
            .await
            .unwrap();
    }

    let node = db.find_node(target).await.unwrap().unwrap();
    let alerted_field = db.nodes().resolve_system_id("field:alerted").await.unwrap();
    assert_eq!(node.property(alerted_field), Some(&PropertyValue::Bool(true)));

    db.set_property(target, "field:alerted", PropertyValue::Bool(false))
        .await
        .unwrap();
    let n = db
        .create_node(CreateNodeInput {
            content: Some("task-extra".into()),
            supertag: Some("supertag:task".into()),
            ..Default::default()
    })
        .await
        .unwrap();
    db.set_property(n, "field:status", PropertyValue::Text("open".into()))
        .await
        .unwrap();

    let node = db.find_node(target).await.unwrap().unwrap();
    assert_eq!(node.property(alerted_field), Some(&PropertyValue::Bool(false)));
}

#[tokio::test]
async fn supertag_inheritance_respects_include_inherited_flag() {
    let db = open().await;

    let task = db
        .create_node(CreateNodeInput {
            content: Some("#Task".into()),
            system_id: Some("supertag:task".into()),
            supertag: Some("supertag:supertag".into()),
            ..Default::default()
    })
        .await
        .unwrap();
    let item = db.nodes().resolve_system_id("supertag:item").await.unwrap();
    db.set_property(task, "field:extends", item.into()).await.unwrap();

    let t = db
        .create_node(CreateNodeInput {
            content: Some("T".into()),
            supertag: Some(task.into()),
            ..Default::default()
    })
        .await
        .unwrap();

    let inherited = db
        .query(QueryDefinition {
            filters: vec![QueryFilter::Supertag {
                    supertag_system_id: "supertag:item".into(),
                    include_inherited: true,
            }],
            sort: None,
            limit: None,
    })
        .await
        .unwrap();
    assert_eq!(inherited.nodes.iter().map(|n| n.id()).collect::<Vec<_>>(), vec![t]);

    let direct_only = db
        .query(QueryDefinition {
            filters: vec![QueryFilter::Supertag {
                    supertag_system_id: "supertag:item".into(),
                    include_inherited: false,
            }],
            sort: None,
            limit: None,
    })
        .await
        .unwrap();
    assert!(direct_only.nodes.is_empty());
}

#[tokio::test]
async fn self_reentrant_automation_is_suppressed_without_overflow() {
    let db = open().await;

    db.create_automation(AutomationDefinition {
            name: "touch marker on change".into(),
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
                event: QueryMembershipEvent::OnChange,
            },
            action: Action::SetProperty {
                field_system_id: "field:content_marker".into(),
                value: ActionValue::Now(NowMarker { now: true }),
            },
    })
        .await
        .unwrap();

    let task = db
        .create_node(CreateNodeInput {
            content: Some("T1".into()),
            supertag: Some("supertag:task".into()),
            ..Default::default()
    })
        .await
        .unwrap();

    // The automation's own `set_property` re-enters the query it is
    // subscribed to (the node still carries `supertag:task`), which would
    // recurse forever without the depth/active-stack guard in.
    db.nodes().update_node_content(task, Some("T1 touched".into())).await.unwrap();

    let node = db.find_node(task).await.unwrap().unwrap();
    let marker_field = db.nodes().resolve_system_id("field:content_marker").await.unwrap();
    assert!(node.property(marker_field).is_some());
}

#[tokio::test]
async fn smart_invalidation_only_notifies_the_matching_subscription() {
    let db = open().await;

    let status_hits = Arc::new(Mutex::new(0usize));
    let priority_hits = Arc::new(Mutex::new(0usize));

    let status_hits_cb = status_hits.clone();
    let _q1 = db
        .subscribe(
        QueryDefinition {
            filters: vec![status_filter("done")],
            sort: None,
            limit: None,
        },
        Arc::new(move |_| {
                *status_hits_cb.lock().unwrap() += 1;
        }),
    )
        .await
        .unwrap();

    let priority_hits_cb = priority_hits.clone();
    let _q2 = db
        .subscribe(
        QueryDefinition {
            filters: vec![QueryFilter::Property {
                    field_system_id: "field:priority".into(),
                    op: PropertyOp::Eq,
                    value: PropertyValue::Text("high".into()),
            }],
            sort: None,
            limit: None,
        },
        Arc::new(move |_| {
                *priority_hits_cb.lock().unwrap() += 1;
        }),
    )
        .await
        .unwrap();

    let n = db.create_node(CreateNodeInput::default()).await.unwrap();
    db.set_property(n, "field:status", PropertyValue::Text("done".into()))
        .await
        .unwrap();

    assert_eq!(*status_hits.lock().unwrap(), 1);
    assert_eq!(*priority_hits.lock().unwrap(), 0);
}
