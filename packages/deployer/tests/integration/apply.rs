use std::fs;

use common::PatchKind;
use deployer::config::PathsConfig;
use deployer::error::AppError;
use deployer::lookup::{EntityRecord, InMemoryLookup};
use deployer::models::patch::{NewPatch, PatchOwner};
use deployer::services::{PatchService, apply_patches, generate_apply_patches_command};

use crate::common::setup_db;

fn lookup_for(owner: &PatchOwner, app_name: Option<&str>) -> InMemoryLookup {
    let mut lookup = InMemoryLookup::new();
    lookup.insert(
        owner.clone(),
        EntityRecord {
            organization_id: "org-1".into(),
            app_name: app_name.map(Into::into),
            server_id: None,
            source_type: Some("git".into()),
        },
    );
    lookup
}

fn patch(owner: &PatchOwner, file_path: &str, kind: PatchKind, content: &str) -> NewPatch {
    NewPatch {
        file_path: file_path.into(),
        content: content.into(),
        kind: Some(kind),
        enabled: Some(true),
        application_id: owner.application_id(),
        compose_id: owner.compose_id(),
    }
}

#[tokio::test]
async fn no_patches_render_empty_command() {
    let db = setup_db().await;
    let owner = PatchOwner::Application("app-1".into());
    let lookup = lookup_for(&owner, Some("web"));

    let command = generate_apply_patches_command(&db, &lookup, &PathsConfig::default(), &owner)
        .await
        .unwrap();

    assert_eq!(command.script, "");
    assert_eq!(
        command.code_root,
        std::path::PathBuf::from("/etc/deployer/applications/web/code")
    );
}

#[tokio::test]
async fn compose_code_root_is_used_for_compose_owners() {
    let db = setup_db().await;
    let owner = PatchOwner::Compose("stack-1".into());
    let lookup = lookup_for(&owner, Some("stack"));
    PatchService::new(&db)
        .create(patch(&owner, "docker-compose.yml", PatchKind::Update, "x"))
        .await
        .unwrap();

    let command = generate_apply_patches_command(&db, &lookup, &PathsConfig::default(), &owner)
        .await
        .unwrap();

    assert!(command.script.contains("/etc/deployer/compose/stack/code/docker-compose.yml"));
    assert!(command.server_id.is_none());
}

#[tokio::test]
async fn code_root_patch_is_refused_and_other_patches_still_render() {
    let db = setup_db().await;
    let owner = PatchOwner::Application("app-1".into());
    let service = PatchService::new(&db);
    service
        .create(patch(&owner, "index.js", PatchKind::Update, "ok"))
        .await
        .unwrap();

    let err = service
        .create(patch(&owner, ".", PatchKind::Update, "x"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let command = generate_apply_patches_command(
        &db,
        &lookup_for(&owner, Some("web")),
        &PathsConfig::default(),
        &owner,
    )
    .await
    .unwrap();
    assert!(command.script.contains("/etc/deployer/applications/web/code/index.js"));
}

#[tokio::test]
async fn unknown_entity_and_missing_app_name_are_errors() {
    let db = setup_db().await;
    let owner = PatchOwner::Application("app-1".into());

    let err = generate_apply_patches_command(
        &db,
        &InMemoryLookup::new(),
        &PathsConfig::default(),
        &owner,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::EntityNotFound(_)));

    let err = generate_apply_patches_command(
        &db,
        &lookup_for(&owner, None),
        &PathsConfig::default(),
        &owner,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Configuration(_)));
}

#[cfg(unix)]
#[tokio::test]
async fn applied_script_creates_and_deletes_files() {
    use deployer::executor::ShellExecutor;

    let sandbox = tempfile::tempdir().unwrap();
    let paths = PathsConfig {
        local_base: sandbox.path().to_path_buf(),
        remote_base: sandbox.path().join("remote"),
    };
    let owner = PatchOwner::Application("app-1".into());
    let lookup = lookup_for(&owner, Some("web"));
    let code = sandbox.path().join("applications/web/code");
    fs::create_dir_all(&code).unwrap();
    fs::write(code.join("obsolete.js"), b"old").unwrap();

    let db = setup_db().await;
    let service = PatchService::new(&db);
    let tricky = "it's \"quoted\" $(id) `id`\n\\n\n";
    service
        .create(patch(&owner, "src/new file.txt", PatchKind::Create, tricky))
        .await
        .unwrap();
    service
        .create(patch(&owner, "obsolete.js", PatchKind::Delete, ""))
        .await
        .unwrap();
    service
        .create(patch(&owner, "never-existed.js", PatchKind::Delete, ""))
        .await
        .unwrap();
    let mut disabled = patch(&owner, "disabled.txt", PatchKind::Create, "no");
    disabled.enabled = Some(false);
    service.create(disabled).await.unwrap();

    let output = apply_patches(&db, &lookup, &paths, &ShellExecutor::default(), &owner)
        .await
        .unwrap()
        .expect("script should have run");

    assert!(output.stdout.contains("Applying 3 patch(es)..."));
    assert_eq!(
        fs::read_to_string(code.join("src/new file.txt")).unwrap(),
        tricky
    );
    assert!(!code.join("obsolete.js").exists());
    assert!(!code.join("never-existed.js").exists());
    assert!(!code.join("disabled.txt").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn nothing_runs_when_every_patch_is_disabled() {
    use deployer::executor::ShellExecutor;

    let db = setup_db().await;
    let owner = PatchOwner::Application("app-1".into());
    let mut disabled = patch(&owner, "a.txt", PatchKind::Update, "a");
    disabled.enabled = Some(false);
    PatchService::new(&db).create(disabled).await.unwrap();

    let result = apply_patches(
        &db,
        &lookup_for(&owner, Some("web")),
        &PathsConfig::default(),
        &ShellExecutor::default(),
        &owner,
    )
    .await
    .unwrap();
    assert!(result.is_none());
}
