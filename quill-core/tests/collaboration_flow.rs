//! End-to-end sharing flows over the in-memory store

use quill_core::core_access::{CollabError, InviteStatus, Role};
use quill_core::core_collab::{
    DocumentService, InviteLifecycle, InviteOutcome, NextStep, OwnershipTransferWorkflow,
};
use quill_core::core_store::{AccessStore, MemoryAccessStore, RetryPolicy};
use quill_core::test_utils::{seed_user, test_state, RecordingMailer, StaticIdentity};
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    store: Arc<MemoryAccessStore>,
    mailer: Arc<RecordingMailer>,
    documents: DocumentService,
    invites: InviteLifecycle,
    transfers: OwnershipTransferWorkflow,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryAccessStore::new());
    let mailer = Arc::new(RecordingMailer::new());
    let identity = Arc::new(StaticIdentity::new());
    Harness {
        documents: DocumentService::new(store.clone()),
        invites: InviteLifecycle::new(
            store.clone(),
            mailer.clone(),
            identity,
            "https://app.test/",
        ),
        transfers: OwnershipTransferWorkflow::new(
            store.clone(),
            RetryPolicy::new(3, Duration::from_millis(1)),
        ),
        store,
        mailer,
    }
}

fn sent_invite(outcome: InviteOutcome) -> quill_core::core_access::Invite {
    match outcome {
        InviteOutcome::Sent(invite) => invite,
        other => panic!("expected a sent invite, got {:?}", other),
    }
}

async fn creator_count(store: &MemoryAccessStore, doc: &quill_core::core_access::DocumentId) -> usize {
    store
        .list_document_access(doc)
        .await
        .unwrap()
        .iter()
        .filter(|a| a.role == Role::Creator)
        .count()
}

/// Create, invite, accept, then transfer: only the owner may hand over
#[tokio::test]
async fn test_invite_accept_then_transfer() {
    let h = harness();
    let u1 = seed_user(h.store.as_ref(), "u1@example.com").await.unwrap();
    let u2 = seed_user(h.store.as_ref(), "u2@example.com").await.unwrap();

    let doc = h
        .documents
        .create_document(&u1.id, test_state("Roadmap"), false)
        .await
        .unwrap();
    assert_eq!(creator_count(&h.store, &doc.id).await, 1);

    let invite = sent_invite(
        h.invites
            .invite(&doc.id, &u1.id, "U2@Example.com", Role::Editor)
            .await
            .unwrap(),
    );
    assert_eq!(invite.collaborator_id, Some(u2.id));

    let accepted = h.invites.accept(&invite.token).await.unwrap();
    assert_eq!(accepted.user.id, u2.id);
    assert!(matches!(accepted.next, NextStep::SignIn { .. }));

    let u2_access = h.store.find_access(&doc.id, &u2.id).await.unwrap().unwrap();
    assert_eq!(u2_access.role, Role::Editor);

    let stolen = h.transfers.transfer(&doc.id, &u2.id, &u2.id).await;
    assert!(matches!(stolen, Err(CollabError::Unauthorized(_))));

    h.transfers.transfer(&doc.id, &u1.id, &u2.id).await.unwrap();

    let doc_after = h.store.get_document(&doc.id).await.unwrap().unwrap();
    assert_eq!(doc_after.owner_id, u2.id);
    let u1_role = h.store.find_access(&doc.id, &u1.id).await.unwrap().unwrap().role;
    let u2_role = h.store.find_access(&doc.id, &u2.id).await.unwrap().unwrap().role;
    assert_eq!(u1_role, Role::Editor);
    assert_eq!(u2_role, Role::Creator);
    assert_eq!(creator_count(&h.store, &doc.id).await, 1);
}

#[tokio::test]
async fn test_exhausted_transfer_leaves_state_untouched() {
    let h = harness();
    let owner = seed_user(h.store.as_ref(), "owner@example.com").await.unwrap();
    let editor = seed_user(h.store.as_ref(), "editor@example.com").await.unwrap();
    let doc = h
        .documents
        .create_document(&owner.id, test_state("Budget"), false)
        .await
        .unwrap();
    quill_core::test_utils::seed_access(h.store.as_ref(), &doc, &editor, Role::Editor)
        .await
        .unwrap();

    h.store.fail_next_transactions(3);
    let result = h.transfers.transfer(&doc.id, &owner.id, &editor.id).await;
    assert!(matches!(result, Err(CollabError::TransferFailed(_))));

    let after = h.store.get_document(&doc.id).await.unwrap().unwrap();
    assert_eq!(after.owner_id, owner.id);
    assert_eq!(
        h.store.find_access(&doc.id, &owner.id).await.unwrap().unwrap().role,
        Role::Creator
    );
    assert_eq!(
        h.store.find_access(&doc.id, &editor.id).await.unwrap().unwrap().role,
        Role::Editor
    );
}

#[tokio::test]
async fn test_reinvite_supersedes_pending() {
    let h = harness();
    let owner = seed_user(h.store.as_ref(), "owner@example.com").await.unwrap();
    let doc = h
        .documents
        .create_document(&owner.id, test_state("Outline"), false)
        .await
        .unwrap();

    let first = sent_invite(
        h.invites
            .invite(&doc.id, &owner.id, "x@y.com", Role::Editor)
            .await
            .unwrap(),
    );
    let second = sent_invite(
        h.invites
            .invite(&doc.id, &owner.id, "x@y.com", Role::Viewer)
            .await
            .unwrap(),
    );

    assert_ne!(first.token, second.token);
    assert!(h.store.find_invite_by_token(&first.token).await.unwrap().is_none());
    let current = h.store.find_invite(&doc.id, "x@y.com").await.unwrap().unwrap();
    assert_eq!(current.id, second.id);
    assert_eq!(current.role, Role::Viewer);

    let old = h.invites.accept(&first.token).await;
    assert!(matches!(old, Err(CollabError::NotFound(_))));
}

#[tokio::test]
async fn test_accept_twice_is_idempotent() {
    let h = harness();
    let owner = seed_user(h.store.as_ref(), "owner@example.com").await.unwrap();
    let doc = h
        .documents
        .create_document(&owner.id, test_state("Draft"), false)
        .await
        .unwrap();
    let invite = sent_invite(
        h.invites
            .invite(&doc.id, &owner.id, "newcomer@example.com", Role::Viewer)
            .await
            .unwrap(),
    );

    let first = h.invites.accept(&invite.token).await.unwrap();
    assert!(!first.already_accepted);
    assert!(matches!(first.next, NextStep::CompleteRegistration { .. }));

    let second = h.invites.accept(&invite.token).await.unwrap();
    assert!(second.already_accepted);
    assert_eq!(second.user.id, first.user.id);

    let rows = h.store.list_document_access(&doc.id).await.unwrap();
    assert_eq!(
        rows.iter().filter(|a| a.collaborator_id == first.user.id).count(),
        1
    );
    assert_eq!(h.mailer.sent_with_template("invite").len(), 1);
    assert_eq!(h.mailer.sent_with_template("welcome").len(), 1);

    let welcome = &h.mailer.sent_with_template("welcome")[0];
    let link = welcome.data["accountSetupLink"].as_str().unwrap();
    assert_eq!(
        link,
        format!(
            "https://app.test/complete-registration/{}?documentId={}",
            first.user.id, doc.id
        )
    );
}

#[tokio::test]
async fn test_invite_after_acceptance_is_noop() {
    let h = harness();
    let owner = seed_user(h.store.as_ref(), "owner@example.com").await.unwrap();
    seed_user(h.store.as_ref(), "friend@example.com").await.unwrap();
    let doc = h
        .documents
        .create_document(&owner.id, test_state("Notes"), false)
        .await
        .unwrap();
    let invite = sent_invite(
        h.invites
            .invite(&doc.id, &owner.id, "friend@example.com", Role::Editor)
            .await
            .unwrap(),
    );
    h.invites.accept(&invite.token).await.unwrap();

    let again = h
        .invites
        .invite(&doc.id, &owner.id, "friend@example.com", Role::Viewer)
        .await
        .unwrap();
    assert!(matches!(again, InviteOutcome::AlreadyAccepted(_)));
    assert_eq!(h.mailer.sent_with_template("invite").len(), 1);
}

#[tokio::test]
async fn test_decline_rules() {
    let h = harness();
    let owner = seed_user(h.store.as_ref(), "owner@example.com").await.unwrap();
    let doc = h
        .documents
        .create_document(&owner.id, test_state("Plan"), false)
        .await
        .unwrap();

    let declined = sent_invite(
        h.invites
            .invite(&doc.id, &owner.id, "a@example.com", Role::Editor)
            .await
            .unwrap(),
    );
    assert_eq!(
        h.invites.decline(&declined.token).await.unwrap().status,
        InviteStatus::Declined
    );
    // Declining again is harmless, accepting is not allowed
    assert!(h.invites.decline(&declined.token).await.is_ok());
    assert!(matches!(
        h.invites.accept(&declined.token).await,
        Err(CollabError::InvalidState(_))
    ));

    let accepted = sent_invite(
        h.invites
            .invite(&doc.id, &owner.id, "b@example.com", Role::Editor)
            .await
            .unwrap(),
    );
    h.invites.accept(&accepted.token).await.unwrap();
    assert!(matches!(
        h.invites.decline(&accepted.token).await,
        Err(CollabError::InvalidState(_))
    ));

    assert!(matches!(
        h.invites.decline("no-such-token").await,
        Err(CollabError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_invite_guards() {
    let h = harness();
    let owner = seed_user(h.store.as_ref(), "owner@example.com").await.unwrap();
    let viewer = seed_user(h.store.as_ref(), "viewer@example.com").await.unwrap();
    let doc = h
        .documents
        .create_document(&owner.id, test_state("Guarded"), false)
        .await
        .unwrap();
    quill_core::test_utils::seed_access(h.store.as_ref(), &doc, &viewer, Role::Viewer)
        .await
        .unwrap();

    let as_creator = h
        .invites
        .invite(&doc.id, &owner.id, "c@example.com", Role::Creator)
        .await;
    assert!(matches!(as_creator, Err(CollabError::InvalidRequest(_))));

    let by_viewer = h
        .invites
        .invite(&doc.id, &viewer.id, "c@example.com", Role::Viewer)
        .await;
    assert!(matches!(by_viewer, Err(CollabError::Forbidden(_))));

    h.mailer.set_failing(true);
    let undelivered = h
        .invites
        .invite(&doc.id, &owner.id, "c@example.com", Role::Viewer)
        .await;
    assert!(matches!(undelivered, Err(CollabError::Internal(_))));
    // The row survives the failed notification
    let kept = h.store.find_invite(&doc.id, "c@example.com").await.unwrap();
    assert_eq!(kept.map(|i| i.status), Some(InviteStatus::Pending));
}

#[tokio::test]
async fn test_creator_role_is_protected() {
    let h = harness();
    let owner = seed_user(h.store.as_ref(), "owner@example.com").await.unwrap();
    let editor = seed_user(h.store.as_ref(), "editor@example.com").await.unwrap();
    let doc = h
        .documents
        .create_document(&owner.id, test_state("Locked"), false)
        .await
        .unwrap();
    let editor_access =
        quill_core::test_utils::seed_access(h.store.as_ref(), &doc, &editor, Role::Editor)
            .await
            .unwrap();
    let owner_access = h.store.find_access(&doc.id, &owner.id).await.unwrap().unwrap();

    let promote = h
        .documents
        .modify_access(&owner.id, &editor_access.id, Role::Creator)
        .await;
    assert!(promote.is_err());

    let revoke_creator = h.documents.revoke_access(&owner.id, &owner_access.id).await;
    assert!(matches!(revoke_creator, Err(CollabError::Forbidden(_))));

    assert_eq!(creator_count(&h.store, &doc.id).await, 1);
}
