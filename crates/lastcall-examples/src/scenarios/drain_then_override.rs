use lastcall::{Element, Kind, Received, channel};

use crate::Config;

#[derive(Clone, Debug, PartialEq)]
enum Job {
    Work(u32),
    Shutdown,
}

impl Element for Job {
    const KIND: Kind = Kind::Enum;
}

pub async fn run(cfg: &Config) -> Result<(), String> {
    let (tx, rx) = channel::<Job>("demo.jobs", cfg.capacity);

    let workers: Vec<_> = (0..3)
        .map(|worker| {
            let rx = rx.clone();
            tokio::spawn(async move {
                let mut done = 0_u32;
                loop {
                    match rx.recv().await {
                        Received::Value(Job::Work(n)) => {
                            println!("worker {worker} handled job {n}");
                            done += 1;
                        }
                        Received::Value(Job::Shutdown) | Received::Override(Job::Shutdown) => {
                            println!("worker {worker} got shutdown after {done} jobs");
                            return done;
                        }
                        Received::Override(other) => {
                            println!("worker {worker} got unexpected override {other:?}");
                            return done;
                        }
                        Received::Closed => {
                            println!("worker {worker} saw a bare close");
                            return done;
                        }
                    }
                }
            })
        })
        .collect();

    for n in 0..10 {
        tx.send(Job::Work(n))
            .await
            .map_err(|e| format!("queue closed while producing: {e}"))?;
    }
    tx.close_with_value(Job::Shutdown)
        .map_err(|e| e.to_string())?;

    let mut total = 0;
    for worker in workers {
        total += worker
            .await
            .map_err(|e| format!("worker panicked: {e}"))?;
    }
    if total != 10 {
        return Err(format!("expected 10 jobs to be handled, got {total}"));
    }
    println!("all {total} queued jobs were handled before shutdown");
    Ok(())
}
