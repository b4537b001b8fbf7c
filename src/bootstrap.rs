//! The bootstrap contract : seeds the meta-supertags, system fields, and
//! common entity supertags a fresh store needs before any query or
//! automation can run. Idempotent — a second call is a no-op once
//! `field:supertag` exists.

use crate::core::Result;
use crate::node::{CreateNodeInput, NodeService, FIELD_EXTENDS, FIELD_SUPERTAG, FIELD_TYPE};

/// `#Supertag`: the meta-supertag every supertag node (including itself) is
/// tagged with.
pub const SUPERTAG_SUPERTAG: &str = "supertag:supertag";
/// `#Field`: the meta-supertag every field node is tagged with.
pub const SUPERTAG_FIELD: &str = "supertag:field";
/// `#System`: marks a node as part of the bootstrap/system furniture rather
/// than user data.
pub const SUPERTAG_SYSTEM: &str = "supertag:system";

pub const SUPERTAG_ITEM: &str = "supertag:item";
pub const SUPERTAG_TOOL: &str = "supertag:tool";
pub const SUPERTAG_REPO: &str = "supertag:repo";
pub const SUPERTAG_TAG: &str = "supertag:tag";
pub const SUPERTAG_COMMAND: &str = "supertag:command";
pub const SUPERTAG_WORKSPACE: &str = "supertag:workspace";
pub const SUPERTAG_INBOX: &str = "supertag:inbox";
pub const SUPERTAG_AUTOMATION: &str = "supertag:automation";
pub const SUPERTAG_COMPUTED_FIELD: &str = "supertag:computed_field";
pub const SUPERTAG_QUERY: &str = "supertag:query";

/// Field used by the `#Tag` hierarchy and, loosely, by any node that models
/// a single-parent tree the way `ownerId` models containment.
pub const FIELD_PARENT: &str = "field:parent";

/// Runs the bootstrap contract against `node_service` unless it already ran
/// (detected by the presence of `field:supertag`).
///
/// Construction order matters: the supertag-field
/// node is inserted unconditionally first (nothing can be tagged before it
/// exists), then the meta-supertag nodes, then the cross-references that
/// finally classify them. Treating this graph as abstractly cyclic and
/// trying to create everything in one pass would deadlock.
pub async fn bootstrap(node_service: &NodeService) -> Result<()> {
    if node_service.resolve_system_id(FIELD_SUPERTAG).await.is_ok() {
        return Ok(());
    }

    // Step 1: the field that assigns supertags exists before anything can be
    // tagged at all, including itself.
    let field_supertag = node_service
        .create_node(CreateNodeInput {
            content: Some("Supertag".into()),
            system_id: Some(FIELD_SUPERTAG.to_string()),
            ..Default::default()
    })
        .await?;

    // Step 2: the meta-supertags. None can be tagged yet either.
    let supertag_supertag = node_service
        .create_node(CreateNodeInput {
            content: Some("Supertag".into()),
            system_id: Some(SUPERTAG_SUPERTAG.to_string()),
            ..Default::default()
    })
        .await?;
    let supertag_field = node_service
        .create_node(CreateNodeInput {
            content: Some("Field".into()),
            system_id: Some(SUPERTAG_FIELD.to_string()),
            ..Default::default()
    })
        .await?;
    let supertag_system = node_service
        .create_node(CreateNodeInput {
            content: Some("System".into()),
            system_id: Some(SUPERTAG_SYSTEM.to_string()),
            ..Default::default()
    })
        .await?;

    // Step 3: wire the cross-references. `field:supertag` now exists, so
    // every subsequent `add_node_supertag` call works normally.
    node_service.add_node_supertag(supertag_supertag, supertag_supertag).await?; // #Supertag is itself a #Supertag
    node_service.add_node_supertag(supertag_field, supertag_supertag).await?;
    node_service.add_node_supertag(supertag_system, supertag_supertag).await?;
    node_service.add_node_supertag(field_supertag, supertag_field).await?;

    for id in [supertag_supertag, supertag_field, supertag_system, field_supertag] {
        node_service.add_node_supertag(id, supertag_system).await?;
    }

    // Remaining system fields.
    let field_extends = node_service
        .create_node(CreateNodeInput {
            content: Some("Extends".into()),
            system_id: Some(FIELD_EXTENDS.to_string()),
            supertag: Some(supertag_field.into()),
            ..Default::default()
    })
        .await?;
    node_service.add_node_supertag(field_extends, supertag_system).await?;

    let field_field_type = node_service
        .create_node(CreateNodeInput {
            content: Some("Field Type".into()),
            system_id: Some(FIELD_TYPE.to_string()),
            supertag: Some(supertag_field.into()),
            ..Default::default()
    })
        .await?;
    node_service.add_node_supertag(field_field_type, supertag_system).await?;

    let field_parent = node_service
        .create_node(CreateNodeInput {
            content: Some("Parent".into()),
            system_id: Some(FIELD_PARENT.to_string()),
            supertag: Some(supertag_field.into()),
            ..Default::default()
    })
        .await?;
    node_service.add_node_supertag(field_parent, supertag_system).await?;

    // Field-type annotations : what shape of value each field expects.
    node_service
        .set_property(field_supertag, FIELD_TYPE, "reference_list".into())
        .await?;
    node_service
        .set_property(field_extends, FIELD_TYPE, "reference".into())
        .await?;
    node_service
        .set_property(field_field_type, FIELD_TYPE, "text".into())
        .await?;
    node_service
        .set_property(field_parent, FIELD_TYPE, "reference".into())
        .await?;

    // Common entity supertags. `#Tool`/`#Repo` extend `#Item`.
    let item = create_entity_supertag(node_service, SUPERTAG_ITEM, "Item", supertag_supertag, supertag_system).await?;
    let tool = create_entity_supertag(node_service, SUPERTAG_TOOL, "Tool", supertag_supertag, supertag_system).await?;
    let repo = create_entity_supertag(node_service, SUPERTAG_REPO, "Repo", supertag_supertag, supertag_system).await?;
    node_service.set_property(tool, FIELD_EXTENDS, item.into()).await?;
    node_service.set_property(repo, FIELD_EXTENDS, item.into()).await?;

    for (system_id, label) in [
        (SUPERTAG_TAG, "Tag"),
        (SUPERTAG_COMMAND, "Command"),
        (SUPERTAG_WORKSPACE, "Workspace"),
        (SUPERTAG_INBOX, "Inbox"),
        (SUPERTAG_AUTOMATION, "Automation"),
        (SUPERTAG_COMPUTED_FIELD, "Computed Field"),
        (SUPERTAG_QUERY, "Query"),
    ] {
        create_entity_supertag(node_service, system_id, label, supertag_supertag, supertag_system).await?;
    }

    node_service.clear_system_node_cache().await;
    Ok(())
}

async fn create_entity_supertag(
    node_service: &NodeService,
    system_id: &str,
    label: &str,
    supertag_supertag: crate::core::NodeId,
    supertag_system: crate::core::NodeId,
) -> Result<crate::core::NodeId> {
    let id = node_service
        .create_node(CreateNodeInput {
            content: Some(label.to_string()),
            system_id: Some(system_id.to_string()),
            supertag: Some(supertag_supertag.into()),
            ..Default::default()
    })
        .await?;
    node_service.add_node_supertag(id, supertag_system).await?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use crate::events::EventBus;
    use crate::storage::InMemoryPersistence;
    use std::sync::Arc;

    async fn service() -> NodeService {
        NodeService::new(
            Arc::new(InMemoryPersistence::new()),
            Arc::new(EventBus::new()),
            Arc::new(TestClock::default()),
        )
    }

    #[tokio::test]
    async fn bootstrap_creates_expected_system_nodes() {
        let svc = service().await;
        bootstrap(&svc).await.unwrap();

        for system_id in [
            FIELD_SUPERTAG,
            FIELD_EXTENDS,
            FIELD_TYPE,
            SUPERTAG_SUPERTAG,
            SUPERTAG_FIELD,
            SUPERTAG_SYSTEM,
            SUPERTAG_ITEM,
            SUPERTAG_TOOL,
            SUPERTAG_REPO,
            SUPERTAG_AUTOMATION,
            SUPERTAG_COMPUTED_FIELD,
        ] {
            assert!(
                svc.resolve_system_id(system_id).await.is_ok(),
                "missing bootstrap node {system_id}"
            );
        }
    }

    #[tokio::test]
    async fn supertag_meta_node_is_tagged_with_itself() {
        let svc = service().await;
        bootstrap(&svc).await.unwrap();
        let supertag_supertag = svc.resolve_system_id(SUPERTAG_SUPERTAG).await.unwrap();
        let node = svc.get_node(supertag_supertag).await.unwrap().unwrap();
        assert!(node.has_supertag(supertag_supertag));
    }

    #[tokio::test]
    async fn tool_and_repo_extend_item() {
        let svc = service().await;
        bootstrap(&svc).await.unwrap();
        let item = svc.resolve_system_id(SUPERTAG_ITEM).await.unwrap();
        let tool = svc.resolve_system_id(SUPERTAG_TOOL).await.unwrap();
        let tool_node = svc.get_node(tool).await.unwrap().unwrap();
        let field_extends = svc.resolve_system_id(FIELD_EXTENDS).await.unwrap();
        assert_eq!(tool_node.property(field_extends).and_then(|v| v.as_ref_id()), Some(item));
    }

    #[tokio::test]
    async fn running_bootstrap_twice_is_a_no_op() {
        let svc = service().await;
        bootstrap(&svc).await.unwrap();
        let before = svc.resolve_system_id(FIELD_SUPERTAG).await.unwrap();
        bootstrap(&svc).await.unwrap();
        let after = svc.resolve_system_id(FIELD_SUPERTAG).await.unwrap();
        assert_eq!(before, after);
    }
}
