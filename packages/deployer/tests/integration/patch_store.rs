use common::PatchKind;
use deployer::error::AppError;
use deployer::models::patch::{NewPatch, PatchChanges, PatchOwner};
use deployer::services::PatchService;

use crate::common::setup_db;

fn new_patch(file_path: &str, owner: &PatchOwner, content: &str) -> NewPatch {
    NewPatch {
        file_path: file_path.to_string(),
        content: content.to_string(),
        kind: None,
        enabled: None,
        application_id: owner.application_id(),
        compose_id: owner.compose_id(),
    }
}

fn app() -> PatchOwner {
    PatchOwner::Application("app-1".into())
}

mod crud {
    use super::*;

    #[tokio::test]
    async fn create_applies_defaults() {
        let db = setup_db().await;
        let service = PatchService::new(&db);

        let created = service
            .create(new_patch("src/index.js", &app(), "console.log(1)"))
            .await
            .unwrap();

        assert_eq!(created.kind, PatchKind::Update);
        assert!(created.enabled);
        assert_eq!(created.content, "console.log(1)\n");
        assert_eq!(created.application_id.as_deref(), Some("app-1"));
        assert!(created.compose_id.is_none());

        let found = service.find_by_id(&created.id).await.unwrap();
        assert_eq!(found.file_path, "src/index.js");
        assert_eq!(found.content, created.content);
    }

    #[tokio::test]
    async fn owner_must_be_exactly_one_reference() {
        let db = setup_db().await;
        let service = PatchService::new(&db);

        let mut both = new_patch("a.txt", &app(), "a");
        both.compose_id = Some("compose-1".into());
        assert!(matches!(
            service.create(both).await,
            Err(AppError::InvalidPatchOwner)
        ));

        let mut neither = new_patch("a.txt", &app(), "a");
        neither.application_id = None;
        assert!(matches!(
            service.create(neither).await,
            Err(AppError::InvalidPatchOwner)
        ));

        assert!(service.find_by_owner(&app()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn escaping_file_paths_are_rejected() {
        let db = setup_db().await;
        let service = PatchService::new(&db);

        for file_path in ["../etc/passwd", "/etc/passwd", "a/../../b", "", ".", "./"] {
            assert!(
                matches!(
                    service.create(new_patch(file_path, &app(), "x")).await,
                    Err(AppError::Validation(_))
                ),
                "{file_path:?}"
            );
        }
    }

    #[tokio::test]
    async fn missing_patch_is_not_found() {
        let db = setup_db().await;
        let service = PatchService::new(&db);

        assert!(matches!(
            service.find_by_id("missing").await,
            Err(AppError::PatchNotFound(id)) if id == "missing"
        ));
        assert!(matches!(
            service.delete("missing").await,
            Err(AppError::PatchNotFound(_))
        ));
        assert!(matches!(
            service.toggle_enabled("missing", false).await,
            Err(AppError::PatchNotFound(_))
        ));
    }

    #[tokio::test]
    async fn update_toggle_and_delete() {
        let db = setup_db().await;
        let service = PatchService::new(&db);
        let created = service
            .create(new_patch("a.txt", &app(), "a\n"))
            .await
            .unwrap();

        let updated = service
            .update(
                &created.id,
                PatchChanges {
                    content: Some("b".into()),
                    kind: Some(PatchKind::Create),
                    ..PatchChanges::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.content, "b\n");
        assert_eq!(updated.kind, PatchKind::Create);
        assert!(updated.updated_at >= created.updated_at);

        let disabled = service.toggle_enabled(&created.id, false).await.unwrap();
        assert!(!disabled.enabled);
        assert_eq!(disabled.content, "b\n");

        let rejected = service
            .update(
                &created.id,
                PatchChanges {
                    file_path: Some("../x".into()),
                    ..PatchChanges::default()
                },
            )
            .await;
        assert!(matches!(rejected, Err(AppError::Validation(_))));

        service.delete(&created.id).await.unwrap();
        assert!(matches!(
            service.find_by_id(&created.id).await,
            Err(AppError::PatchNotFound(_))
        ));
    }

    #[tokio::test]
    async fn listing_is_ordered_by_file_path() {
        let db = setup_db().await;
        let service = PatchService::new(&db);
        for file_path in ["b.txt", "c/d.txt", "a.txt"] {
            service
                .create(new_patch(file_path, &app(), "x"))
                .await
                .unwrap();
        }
        service
            .create(new_patch("a.txt", &PatchOwner::Compose("app-1".into()), "x"))
            .await
            .unwrap();

        let listed: Vec<_> = service
            .find_by_owner(&app())
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.file_path)
            .collect();
        assert_eq!(listed, ["a.txt", "b.txt", "c/d.txt"]);
    }
}

mod uniqueness {
    use super::*;

    #[tokio::test]
    async fn duplicate_file_path_for_same_owner_conflicts() {
        let db = setup_db().await;
        let service = PatchService::new(&db);

        service
            .create(new_patch("config.yml", &app(), "a"))
            .await
            .unwrap();
        let second = service.create(new_patch("config.yml", &app(), "b")).await;

        assert!(matches!(second, Err(AppError::Conflict(_))));
        let stored = service.find_by_owner(&app()).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].content, "a\n");
    }

    #[tokio::test]
    async fn same_file_path_for_other_owners_is_allowed() {
        let db = setup_db().await;
        let service = PatchService::new(&db);

        service
            .create(new_patch("config.yml", &app(), "a"))
            .await
            .unwrap();
        service
            .create(new_patch(
                "config.yml",
                &PatchOwner::Application("app-2".into()),
                "b",
            ))
            .await
            .unwrap();
        service
            .create(new_patch(
                "config.yml",
                &PatchOwner::Compose("compose-1".into()),
                "c",
            ))
            .await
            .unwrap();
        service
            .create(new_patch(
                "config.yml",
                &PatchOwner::Compose("compose-2".into()),
                "d",
            ))
            .await
            .unwrap();
    }
}

mod save_as_patch {
    use super::*;

    #[tokio::test]
    async fn edits_create_then_update_one_patch() {
        let db = setup_db().await;
        let service = PatchService::new(&db);

        let first = service
            .save_file_as_patch(&app(), "index.js", "old\n", "new".into())
            .await
            .unwrap();
        assert!(!first.deleted);
        let id = first.patch_id.clone().unwrap();

        let second = service
            .save_file_as_patch(&app(), "index.js", "old\n", "newer".into())
            .await
            .unwrap();
        assert_eq!(second.patch_id.as_deref(), Some(id.as_str()));

        let stored = service.find_by_id(&id).await.unwrap();
        assert_eq!(stored.content, "newer\n");
        assert_eq!(stored.kind, PatchKind::Update);
    }

    #[tokio::test]
    async fn reverting_to_repository_content_deletes_patch() {
        let db = setup_db().await;
        let service = PatchService::new(&db);

        service
            .save_file_as_patch(&app(), "index.js", "old\n", "new\n".into())
            .await
            .unwrap();
        let reverted = service
            .save_file_as_patch(&app(), "index.js", "old\n", "old".into())
            .await
            .unwrap();

        assert!(reverted.deleted);
        assert!(reverted.patch_id.is_none());
        assert!(
            service
                .find_by_file_path("index.js", &app())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn unchanged_content_without_patch_is_a_no_op() {
        let db = setup_db().await;
        let service = PatchService::new(&db);

        let outcome = service
            .save_file_as_patch(&app(), "index.js", "same\n", "same\n".into())
            .await
            .unwrap();
        assert!(outcome.deleted);
        assert!(service.find_by_owner(&app()).await.unwrap().is_empty());
    }
}
