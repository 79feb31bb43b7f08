use dshare_core::session::DISCONNECTED_MESSAGE;
use dshare_core::testutil::{RecordingSignals, ScriptedIdentity};
use dshare_core::{FileId, FileRegistry, LoginMethod, PublicKey, Session, Signals, StoredFile};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

fn setup() -> (Arc<ScriptedIdentity>, Arc<RecordingSignals>, Arc<FileRegistry>, Arc<Session>) {
    let identity = Arc::new(ScriptedIdentity::new());
    let signals = Arc::new(RecordingSignals::default());
    let registry = Arc::new(FileRegistry::new());
    let session = Session::new(
        identity.clone(),
        registry.clone(),
        Signals::from_shared(signals.clone()),
    );
    (identity, signals, registry, session)
}

#[tokio::test]
async fn login_then_fetch_details_caches_profile() {
    let (identity, signals, _registry, session) = setup();
    let address = identity.register("alice@example.com", PublicKey::from([1u8; 32]));

    assert!(!session.is_logged_in().await.unwrap());
    session
        .login(LoginMethod::Social {
            provider: "google".into(),
            email: "alice@example.com".into(),
        })
        .await
        .unwrap();
    assert!(session.is_logged_in().await.unwrap());

    let profile = session.fetch_user_details().await.unwrap();
    assert_eq!(profile.address(), address);
    assert_eq!(session.profile(), Some(profile));
    assert_eq!(signals.busy_set_count(), signals.busy_clear_count());
    assert!(signals.errors().is_empty());
}

#[tokio::test]
async fn failed_login_notifies() {
    let (_identity, signals, _registry, session) = setup();

    let err = session
        .login(LoginMethod::SeedPhrase {
            email: "stranger@example.com".into(),
            phrase: "not a phrase".into(),
        })
        .await
        .unwrap_err();

    assert!(err.to_string().contains("stranger@example.com"));
    assert_eq!(signals.errors().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disconnect_clears_local_state() {
    let (identity, signals, registry, session) = setup();
    identity.register("alice@example.com", PublicKey::from([1u8; 32]));
    let _watcher = session.init();

    session
        .login(LoginMethod::Social {
            provider: "google".into(),
            email: "alice@example.com".into(),
        })
        .await
        .unwrap();
    session.fetch_user_details().await.unwrap();
    registry.add_mine(StoredFile::new(
        FileId::new("did-a"),
        SystemTime::UNIX_EPOCH,
        3,
    ));

    identity.disconnect();

    tokio::time::timeout(Duration::from_secs(5), async {
        while signals.errors().is_empty() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("disconnect never handled");

    assert_eq!(signals.errors(), vec![DISCONNECTED_MESSAGE.to_string()]);
    assert!(registry.mine().is_empty());
    assert!(session.profile().is_none());
}
