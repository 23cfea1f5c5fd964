//! Test fixtures for seeding the access store

use crate::core_access::{
    Document, DocumentAccess, DocumentMedia, DocumentState, MediaLocator, Role, Timestamp, User,
};
use crate::core_store::{AccessStore, StoreResult};

/// Builder for test users
pub struct TestUserBuilder {
    user: User,
}

impl TestUserBuilder {
    pub fn new(email: &str) -> Self {
        Self {
            user: User::stub(email),
        }
    }

    /// Fill in first and last name so the profile counts as complete
    pub fn registered(mut self) -> Self {
        let local = self.user.email.split('@').next().unwrap_or("user").to_string();
        self.user.first_name = Some(local);
        self.user.last_name = Some("Tester".to_string());
        self
    }

    pub fn build(self) -> User {
        self.user
    }

    pub async fn create(self, store: &dyn AccessStore) -> StoreResult<User> {
        let user = self.build();
        store.create_user(&user).await?;
        Ok(user)
    }
}

/// A registered user stored in `store`
pub async fn seed_user(store: &dyn AccessStore, email: &str) -> StoreResult<User> {
    TestUserBuilder::new(email).registered().create(store).await
}

pub fn test_state(title: &str) -> DocumentState {
    DocumentState {
        title: title.to_string(),
        content: Some(format!("<p>{}</p>", title)),
    }
}

/// A private document owned by `owner`, with its Creator row
pub async fn seed_document(
    store: &dyn AccessStore,
    owner: &User,
    title: &str,
) -> StoreResult<Document> {
    let document = Document::new(owner.id, test_state(title), false);
    let creator = DocumentAccess::new(document.id, owner.id, Role::Creator);
    store.create_document(&document, &creator).await?;
    Ok(document)
}

/// Grant `user` a direct role on `document`
pub async fn seed_access(
    store: &dyn AccessStore,
    document: &Document,
    user: &User,
    role: Role,
) -> StoreResult<DocumentAccess> {
    let access = DocumentAccess::new(document.id, user.id, role);
    store.create_access(&access).await?;
    Ok(access)
}

/// A media record for `document` created at `created_at`
pub async fn seed_media(
    store: &dyn AccessStore,
    document: &Document,
    public_id: &str,
    created_at: Timestamp,
) -> StoreResult<DocumentMedia> {
    let mut media = DocumentMedia::new(
        document.id,
        MediaLocator {
            public_id: public_id.to_string(),
            secure_url: format!("https://media.test/{}", public_id),
        },
        "pdf",
    );
    media.created_at = created_at;
    store.create_media(&media).await?;
    Ok(media)
}
