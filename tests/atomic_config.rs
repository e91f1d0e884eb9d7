use std::{
    sync::{Arc, mpsc},
    thread,
};

use sbforge::{AtomicConfig, DomainConfig, core::UpdateError};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_never_lose_updates() {
    let config = Arc::new(AtomicConfig::new(DomainConfig::default()));
    let start = config.get().backup.keep;

    let writers: Vec<_> = (0..8)
        .map(|_| {
            let config = Arc::clone(&config);
            tokio::spawn(async move {
                for _ in 0..50 {
                    config
                        .update(|c| {
                            c.backup.keep += 1;
                            Ok::<_, std::convert::Infallible>(())
                        })
                        .unwrap();
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    let reader = {
        let config = Arc::clone(&config);
        tokio::spawn(async move {
            let mut last = 0;
            for _ in 0..200 {
                let keep = config.get().backup.keep;
                assert!(keep >= last, "snapshots went backwards");
                last = keep;
                tokio::task::yield_now().await;
            }
        })
    };

    for writer in writers {
        writer.await.unwrap();
    }
    reader.await.unwrap();

    assert_eq!(config.get().backup.keep, start + 400);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn held_snapshot_is_immutable() {
    let config = AtomicConfig::new(DomainConfig::default());
    let held = config.get();

    config
        .update(|c| {
            c.log.level = "debug".to_string();
            Ok::<_, std::convert::Infallible>(())
        })
        .unwrap();

    assert_eq!(held.log.level, "warn");
    assert_eq!(config.get().log.level, "debug");
}

#[test]
fn rejected_update_is_invisible() {
    let config = AtomicConfig::new(DomainConfig::default());
    let before = config.get();

    let result = config.update(|c| {
        c.cert_dir.clear();
        Ok::<_, std::convert::Infallible>(())
    });
    assert!(matches!(result, Err(UpdateError::Validation(_))));
    assert!(Arc::ptr_eq(&before, &config.get()));
}

#[test]
fn readers_see_old_snapshot_while_update_is_in_flight() {
    let config = Arc::new(AtomicConfig::new(DomainConfig::default()));
    let before = config.get();
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let writer = {
        let config = Arc::clone(&config);
        thread::spawn(move || {
            config
                .update(|c| {
                    c.log.level = "debug".to_string();
                    entered_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                    Ok::<_, std::convert::Infallible>(())
                })
                .unwrap();
        })
    };

    entered_rx.recv().unwrap();
    let reader = {
        let config = Arc::clone(&config);
        thread::spawn(move || config.get())
    };
    let seen = reader.join().unwrap();
    assert!(Arc::ptr_eq(&before, &seen));
    assert_eq!(seen.log.level, "warn");

    release_tx.send(()).unwrap();
    writer.join().unwrap();
    assert_eq!(config.get().log.level, "debug");
    assert_eq!(before.log.level, "warn");
}
