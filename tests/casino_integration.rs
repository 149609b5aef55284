//! End-to-end behavior of the casino floor

use std::sync::{Arc, Mutex};
use std::time::Duration;

use casino_floor::agent::Agent;
use casino_floor::casino::{Casino, Croupier, Exchange, Floor, GameType, Player};
use casino_floor::core::config::{CasinoConfig, Timings};
use casino_floor::core::types::Vec2;

fn player(name: &str, balance: f32, chips: u32) -> Arc<Player> {
    Arc::new(Player::new(name, 0, balance, chips, Vec2::ZERO))
}

#[tokio::test(start_paused = true)]
async fn test_cash_out_scenario() {
    let config = CasinoConfig {
        players: 0,
        cashiers: 1,
        ..Default::default()
    };
    let floor = Floor::new(&config);
    let p = player("Player1", 10_000.0, 10);

    let ticket = floor.find_cashier(&p).unwrap();
    let cashier = Arc::clone(ticket.cashier());
    assert_eq!(cashier.queue_len(), 1);

    let gate = ticket.into_gate().await.unwrap();
    cashier
        .exchange(&gate, &p, Exchange::CashOut { chips: 10 })
        .await
        .unwrap();
    drop(gate);

    assert_eq!(cashier.queue_len(), 0);
    assert_eq!(p.chips(), 0);
    assert!((p.balance() - 10_015.0).abs() < 0.01);
}

#[tokio::test(start_paused = true)]
async fn test_cashier_serves_in_assignment_order() {
    let config = CasinoConfig {
        cashiers: 1,
        ..Default::default()
    };
    let floor = Floor::new(&config);
    let cashier = Arc::clone(&floor.cashiers()[0]);
    let served = Arc::new(Mutex::new(Vec::new()));

    let players: Vec<_> = ["A", "B", "C"].iter().map(|n| player(n, 0.0, 2)).collect();
    for p in &players {
        cashier.assign(p);
    }

    // Spawned in reverse so the order can only come from the queue
    let mut handles = Vec::new();
    for p in players.iter().rev() {
        let cashier = Arc::clone(&cashier);
        let p = Arc::clone(p);
        let served = Arc::clone(&served);
        handles.push(tokio::spawn(async move {
            let gate = cashier.acquire_gate(&p).await.unwrap();
            cashier
                .exchange(&gate, &p, Exchange::CashOut { chips: 2 })
                .await
                .unwrap();
            served.lock().unwrap().push(p.name().to_string());
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    assert_eq!(*served.lock().unwrap(), vec!["A", "B", "C"]);
    assert_eq!(cashier.queue_len(), 0);
}

#[test]
fn test_least_loaded_cashier_selection() {
    let config = CasinoConfig {
        cashiers: 3,
        ..Default::default()
    };
    let floor = Floor::new(&config);
    let cashiers = floor.cashiers();

    // Queue lengths [2, 0, 1]
    cashiers[0].assign(&player("Q1", 0.0, 0));
    cashiers[0].assign(&player("Q2", 0.0, 0));
    cashiers[2].assign(&player("Q3", 0.0, 0));

    let first = floor.find_cashier(&player("P1", 0.0, 0)).unwrap();
    assert_eq!(first.cashier().name(), "Cashier2");
    assert_eq!(first.cashier().queue_len(), 1);

    // Lengths [2, 1, 1]: the tie goes to the lower-numbered cashier
    let second = floor.find_cashier(&player("P2", 0.0, 0)).unwrap();
    assert_eq!(second.cashier().name(), "Cashier2");
    let lengths: Vec<_> = cashiers.iter().map(|c| c.queue_len()).collect();
    assert_eq!(lengths, vec![2, 2, 1]);

    // Unused tickets give their places back
    drop(first);
    drop(second);
    let lengths: Vec<_> = cashiers.iter().map(|c| c.queue_len()).collect();
    assert_eq!(lengths, vec![2, 0, 1]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_table_never_exceeds_capacity() {
    let config = CasinoConfig {
        table_capacity: 3,
        ..Default::default()
    };
    let croupier = Arc::new(Croupier::new(1, GameType::Roulette, &config));

    let mut handles = Vec::new();
    for i in 0..24 {
        let croupier = Arc::clone(&croupier);
        handles.push(tokio::spawn(async move {
            let p = player(&format!("P{}", i), 0.0, 5);
            let seated = croupier.add_player(&p).await.is_some();
            assert!(croupier.num_players() <= croupier.capacity());
            (seated, p.chips())
        }));
    }

    let mut seated = 0;
    for h in handles {
        let (ok, chips) = h.await.unwrap();
        if ok {
            seated += 1;
            assert_eq!(chips, 4);
        } else {
            // Rejected players are never charged
            assert_eq!(chips, 5);
        }
    }
    assert_eq!(seated, 3);
    assert_eq!(croupier.num_players(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_slot_machine_claims() {
    let config = CasinoConfig {
        slot_machines: 2,
        ..Default::default()
    };
    let floor = Arc::new(Floor::new(&config));

    let mut handles = Vec::new();
    for i in 0..10 {
        let floor = Arc::clone(&floor);
        handles.push(tokio::spawn(async move {
            let p = player(&format!("P{}", i), 10.0, 0);
            floor.find_slot_machine(&p).is_some()
        }));
    }
    let mut claimed = 0;
    for h in handles {
        if h.await.unwrap() {
            claimed += 1;
        }
    }
    assert_eq!(claimed, 2);
    for machine in floor.slot_machines() {
        assert!(!machine.is_available());
        assert!(machine.active_player().is_some());
    }
}

fn busy_casino() -> Casino {
    Casino::new(CasinoConfig {
        players: 12,
        cashiers: 2,
        slot_machines: 2,
        croupiers: 2,
        table_capacity: 3,
        table_games: vec![GameType::Roulette, GameType::Blackjack],
        timings: Timings {
            player_drain_ms: 600_000,
            ..Timings::uniform(1)
        },
        walk_speed: 20.0,
        seed: Some(7),
        ..Default::default()
    })
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_close_drains_players_then_resources() {
    let casino = busy_casino();
    casino.open().unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    let report = casino.close().await;
    assert!(report.is_clean(), "{:?}", report);
    assert_eq!(report.finished, 12 + 2 + 2 + 2);

    for p in casino.players() {
        assert!(!p.is_alive());
        assert_eq!(p.state_label(), "OUT");
        // Everyone cashed out before leaving
        assert_eq!(p.chips(), 0);
        assert!(p.balance() >= 0.0);
    }
    for agent in casino.floor().resources() {
        assert!(!agent.is_alive());
        assert_eq!(agent.state_label(), "CLOSED");
    }
    for cashier in casino.floor().cashiers() {
        assert_eq!(cashier.queue_len(), 0);
    }
    for croupier in casino.floor().croupiers() {
        assert_eq!(croupier.num_players(), 0);
    }
}

#[tokio::test(start_paused = true)]
async fn test_close_is_idempotent() {
    let casino = busy_casino();
    casino.open().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let first = casino.close().await;
    assert!(first.is_clean());
    let second = casino.close().await;
    assert_eq!(second.finished, 0);
    assert!(second.is_clean());
    assert!(casino.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_aborted_players_leave_no_resource_held() {
    let mut config = busy_casino().config().clone();
    config.timings.player_drain_ms = 1;
    let casino = Casino::new(config).unwrap();
    casino.open().unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    let report = casino.close().await;
    assert!(report.panicked.is_empty());
    assert!(report.aborted.len() <= 12);

    for cashier in casino.floor().cashiers() {
        assert_eq!(cashier.queue_len(), 0);
    }
    for machine in casino.floor().slot_machines() {
        assert!(machine.active_player().is_none());
    }
    for croupier in casino.floor().croupiers() {
        assert_eq!(croupier.num_players(), 0);
    }
}
