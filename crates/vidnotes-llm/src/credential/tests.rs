use super::*;
use std::time::Duration;

fn pool_of(n: usize) -> CredentialPool {
    let creds = (0..n)
        .map(|i| {
            Credential::new(
                CredentialId::new(format!("key-{i}")).unwrap(),
                SecretString::from(format!("secret-value-{i:04}")),
            )
        })
        .collect();
    CredentialPool::new(creds).unwrap()
}

fn id(i: usize) -> CredentialId {
    CredentialId::new(format!("key-{i}")).unwrap()
}

#[test]
fn test_empty_pool_rejected() {
    assert!(CredentialPool::new(Vec::new()).is_err());
}

#[test]
fn test_duplicate_ids_rejected() {
    let creds = vec![
        Credential::new(id(0), SecretString::from("secret-value-a")),
        Credential::new(id(0), SecretString::from("secret-value-b")),
    ];
    assert!(CredentialPool::new(creds).is_err());
}

#[test]
fn test_round_robin_visits_each_once_in_order() {
    let pool = pool_of(4);
    let picked: Vec<String> = (0..4)
        .map(|_| pool.next().unwrap().id.to_string())
        .collect();
    assert_eq!(picked, vec!["key-0", "key-1", "key-2", "key-3"]);

    // Wraps around
    assert_eq!(pool.next().unwrap().id, id(0));
}

#[tokio::test(start_paused = true)]
async fn test_cooldown_respected_until_expiry() {
    let pool = pool_of(3);
    let first = pool.next().unwrap();
    assert_eq!(first.id, id(0));

    pool.mark_failed(&id(0), Duration::from_millis(5000));

    for _ in 0..10 {
        assert_ne!(pool.next().unwrap().id, id(0));
    }

    tokio::time::advance(Duration::from_millis(4999)).await;
    for _ in 0..4 {
        assert_ne!(pool.next().unwrap().id, id(0));
    }

    tokio::time::advance(Duration::from_millis(1)).await;
    assert_eq!(pool.clean_expired(), 1);
    let seen: Vec<CredentialId> = (0..3).map(|_| pool.next().unwrap().id).collect();
    assert!(seen.contains(&id(0)));
}

#[test]
fn test_mark_failed_moves_cursor_off_failed_credential() {
    let pool = pool_of(3);
    // cursor at key-0; fail it before it is ever selected
    pool.mark_failed(&id(0), Duration::from_secs(60));
    assert_eq!(pool.next().unwrap().id, id(1));
}

#[tokio::test(start_paused = true)]
async fn test_exhaustion_is_reported_not_looped() {
    let pool = pool_of(3);
    for i in 0..3 {
        pool.mark_failed(&id(i), Duration::from_secs(10 + i as u64));
    }

    let err = pool.next().unwrap_err();
    assert_eq!(err.total, 3);
    assert_eq!(err.retry_in, Some(Duration::from_secs(10)));
    assert_eq!(pool.available_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_single_failure_is_not_exhaustion() {
    let pool = pool_of(3);
    pool.mark_failed(&id(1), Duration::from_secs(30));
    assert!(pool.next().is_ok());
    assert_eq!(pool.available_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_pool_recovers_after_expiry() {
    let pool = pool_of(2);
    pool.mark_failed(&id(0), Duration::from_secs(5));
    pool.mark_failed(&id(1), Duration::from_secs(5));
    assert!(pool.next().is_err());

    tokio::time::advance(Duration::from_secs(5)).await;
    assert!(pool.next().is_ok());
}

#[test]
fn test_failure_streak_resets_on_success() {
    let pool = pool_of(2);
    pool.mark_failed(&id(0), Duration::ZERO);
    pool.mark_failed(&id(0), Duration::ZERO);
    assert_eq!(pool.consecutive_failures(&id(0)), 2);

    pool.mark_succeeded(&id(0));
    assert_eq!(pool.consecutive_failures(&id(0)), 0);
}

#[test]
fn test_reset_cooldowns() {
    let pool = pool_of(2);
    pool.mark_failed(&id(0), Duration::from_secs(600));
    pool.mark_failed(&id(1), Duration::from_secs(600));
    assert_eq!(pool.available_count(), 0);

    pool.reset_cooldowns();
    assert_eq!(pool.available_count(), 2);
    assert_eq!(pool.consecutive_failures(&id(0)), 0);
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_reports_remaining_cooldown() {
    let pool = pool_of(2);
    pool.mark_failed(&id(0), Duration::from_secs(5));
    tokio::time::advance(Duration::from_secs(2)).await;

    let snap = pool.snapshot();
    assert!(snap[0].cooling);
    assert_eq!(snap[0].cooldown_remaining_ms, Some(3000));
    assert_eq!(snap[0].consecutive_failures, 1);
    assert!(!snap[1].cooling);
    assert!(!snap[0].key.contains("secret-value"));
}

#[test]
fn test_last_used_tracks_selection() {
    let pool = pool_of(2);
    assert!(pool.last_used().is_none());
    pool.next().unwrap();
    pool.next().unwrap();
    assert_eq!(pool.last_used(), Some(id(1)));
}

#[test]
fn test_concurrent_selection_keeps_state_consistent() {
    let pool = std::sync::Arc::new(pool_of(4));
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let pool = pool.clone();
            std::thread::spawn(move || {
                for _ in 0..100 {
                    let c = pool.next().unwrap();
                    if t % 2 == 0 {
                        pool.mark_failed(&c.id, Duration::ZERO);
                    } else {
                        pool.mark_succeeded(&c.id);
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(pool.len(), 4);
    assert_eq!(pool.snapshot().len(), 4);
}

#[test]
fn test_credential_config_resolution() {
    let inline = CredentialConfig {
        id: "inline".to_string(),
        api_key: Some("abcdefghijklmnop".to_string()),
        api_key_env: None,
    };
    assert_eq!(inline.resolve().unwrap().id().as_str(), "inline");

    let missing = CredentialConfig {
        id: "env".to_string(),
        api_key: None,
        api_key_env: Some("VIDNOTES_TEST_KEY_THAT_IS_NOT_SET".to_string()),
    };
    assert!(matches!(
        missing.resolve(),
        Err(Error::InvalidCredential { .. })
    ));

    let empty = CredentialConfig::default();
    assert!(empty.resolve().is_err());
}

#[test]
fn test_credentials_from_list() {
    let creds = credentials_from_list("aaaaaaaaaaaa, bbbbbbbbbbbb,,cccccccccccc").unwrap();
    let ids: Vec<&str> = creds.iter().map(|c| c.id().as_str()).collect();
    assert_eq!(ids, vec!["key-1", "key-2", "key-3"]);
}

#[test]
fn test_debug_masks_secret() {
    let cred = Credential::new(id(0), SecretString::from("AIzaSyVerySecretValue1234"));
    let dbg = format!("{cred:?}");
    assert!(!dbg.contains("VerySecret"));
    assert!(dbg.contains("AIza...1234"));
}
