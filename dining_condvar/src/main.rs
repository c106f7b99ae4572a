use std::{error::Error, sync::Arc, thread, time::Duration};

use libc::SIGINT;
use signal_hook::iterator::Signals;
use table::{State, Table};

mod table;

const NUM_PHILOSOPHERS: usize = 5;
const THINK_TIME: Duration = Duration::from_secs(1);
const EAT_TIME: Duration = Duration::from_secs(3);

// 状態テーブルを1行にして返す
fn render<const N: usize>(state: &[State; N]) -> String {
    state
        .iter()
        .map(|s| match s {
            State::Thinking => " T ",
            State::Hungry => " H ",
            State::Eating => " E ",
        })
        .collect()
}

// 哲学者1人分のループ
// 考える → 箸を取る → 食べる → 箸を置く、をキャンセルされるまで繰り返す
fn philosopher(table: Arc<Table<NUM_PHILOSOPHERS>>, i: usize) {
    while table.is_running() {
        thread::sleep(THINK_TIME);
        if !table.take_forks(i) {
            break; // キャンセルで起こされた
        }
        thread::sleep(EAT_TIME);
        table.put_forks(i);
    }
    println!("philosopher {} is exiting", i + 1);
}

fn main() -> Result<(), Box<dyn Error>> {
    println!("-----T represents THINKING, H represents HUNGRY, E represents EATING-----");
    println!("Press Ctrl+C to exit safely");

    let table: Arc<Table<NUM_PHILOSOPHERS>> = Arc::new(Table::new(|i, state| {
        let verb = match state[i] {
            State::Thinking => "THINKING",
            State::Hungry => "HUNGRY  ",
            State::Eating => "EATING  ",
        };
        println!("philosopher {} is {}\t{}", i + 1, verb, render(&state));
    }));

    // SIGINT でフラグを立てて全員を起こす
    let mut signals = Signals::new([SIGINT])?;
    {
        let table0 = table.clone();
        thread::spawn(move || {
            if let Some(sig) = signals.forever().next() {
                println!("\nreceived signal: {:?}, cleaning up...", sig);
                table0.cancel();
            }
        });
    }

    let mut v = Vec::new();
    for i in 0..NUM_PHILOSOPHERS {
        let table0 = table.clone();
        v.push(thread::spawn(move || philosopher(table0, i)));
    }

    for t in v {
        t.join().unwrap();
    }

    println!("all philosophers terminated");
    Ok(())
}
