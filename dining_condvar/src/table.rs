use std::sync::{
    atomic::{AtomicBool, Ordering},
    Condvar, Mutex,
};

// 哲学者の状態
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum State {
    Thinking,
    Hungry,
    Eating,
}

// 状態テーブルを持つモニタ
// テーブル全体を1つの Mutex で守り、哲学者ごとに Condvar を1つ持つ
// 箸そのものは登場しない。両隣が Eating でないこと = 両方の箸が取れること
pub struct Table<const N: usize> {
    state: Mutex<[State; N]>,
    cond: [Condvar; N],
    running: AtomicBool,
    // 状態が変わるたびにロックを持ったまま呼ばれる観測用フック
    // スナップショットのコピーを渡すだけなので、フック側から状態は変更できない
    hook: Box<dyn Fn(usize, [State; N]) + Send + Sync>,
}

impl<const N: usize> Table<N> {
    pub fn new<F>(hook: F) -> Self
    where
        F: Fn(usize, [State; N]) + Send + Sync + 'static,
    {
        Table {
            state: Mutex::new([State::Thinking; N]),
            cond: std::array::from_fn(|_| Condvar::new()),
            running: AtomicBool::new(true),
            hook: Box::new(hook),
        }
    }

    fn left(i: usize) -> usize {
        (i + N - 1) % N
    }

    fn right(i: usize) -> usize {
        (i + 1) % N
    }

    // i が食事に移ってよいか
    // 条件の評価と遷移を同じ排他区間で行うので、片方の箸だけ持つ状態は存在しえない
    // ただし公平性はない。両隣が交互に食べ続けると i はいつまでも飢える可能性がある
    fn can_eat(state: &[State; N], i: usize) -> bool {
        state[i] == State::Hungry
            && state[Self::left(i)] != State::Eating
            && state[Self::right(i)] != State::Eating
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // 両方の箸が取れるまでブロックする
    // キャンセルで起こされた場合は Hungry を取り消して false を返す
    pub fn take_forks(&self, i: usize) -> bool {
        assert!(i < N);
        let mut state = self.state.lock().unwrap();
        state[i] = State::Hungry;
        (self.hook)(i, *state);

        // notify はあくまで再試行のヒントで、食べられる保証ではないので
        // 起こされるたびに条件を再評価する
        loop {
            if !self.is_running() {
                state[i] = State::Thinking;
                (self.hook)(i, *state);
                return false;
            }
            if Self::can_eat(&state, i) {
                break;
            }
            state = self.cond[i].wait(state).unwrap();
        }

        state[i] = State::Eating;
        (self.hook)(i, *state);
        true
    }

    // 箸を置いて両隣を起こす
    // 無条件に notify して、食べられるかどうかは起きた側に再評価させる
    pub fn put_forks(&self, i: usize) {
        assert!(i < N);
        let mut state = self.state.lock().unwrap();
        state[i] = State::Thinking;
        (self.hook)(i, *state);
        self.cond[Self::left(i)].notify_one();
        self.cond[Self::right(i)].notify_one();
    }

    // キャンセル要求。フラグを立ててから全員を起こす
    // ロックを取ってから notify することで、wait 直前のスレッドが
    // フラグ確認と wait の間で通知を取りこぼすことがなくなる
    pub fn cancel(&self) {
        self.running.store(false, Ordering::SeqCst);
        let _state = self.state.lock().unwrap();
        for c in &self.cond {
            c.notify_all();
        }
    }

    pub fn snapshot(&self) -> [State; N] {
        *self.state.lock().unwrap()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn recording_table<const N: usize>() -> (Arc<Table<N>>, Arc<Mutex<Vec<[State; N]>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log0 = log.clone();
        let table = Arc::new(Table::new(move |_, s| {
            log0.lock().unwrap().push(s);
        }));
        (table, log)
    }

    fn eating_count<const N: usize>(s: &[State; N]) -> usize {
        s.iter().filter(|&&st| st == State::Eating).count()
    }

    fn no_adjacent_eating<const N: usize>(s: &[State; N]) -> bool {
        (0..N).all(|i| s[i] != State::Eating || s[(i + 1) % N] != State::Eating)
    }

    #[test]
    fn test_non_adjacent_both_eat() {
        let (table, _) = recording_table::<5>();
        // 0 と 2 は隣接していないので、どちらも待たずに食べられる
        assert!(table.take_forks(0));
        assert!(table.take_forks(2));
        let s = table.snapshot();
        assert_eq!(s[0], State::Eating);
        assert_eq!(s[2], State::Eating);
        table.put_forks(0);
        table.put_forks(2);
        assert_eq!(table.snapshot(), [State::Thinking; 5]);
    }

    #[test]
    fn test_adjacent_mutual_exclusion() {
        let (table, log) = recording_table::<5>();
        assert!(table.take_forks(0));

        // 1 は 0 と箸を共有しているので、0 が置くまで Hungry のまま待つ
        let t = {
            let table0 = table.clone();
            thread::spawn(move || table0.take_forks(1))
        };
        thread::sleep(Duration::from_millis(100));
        assert_eq!(table.snapshot()[1], State::Hungry);

        table.put_forks(0);
        assert!(t.join().unwrap());
        assert_eq!(table.snapshot()[1], State::Eating);
        table.put_forks(1);

        for s in log.lock().unwrap().iter() {
            assert!(no_adjacent_eating(s));
        }
    }

    #[test]
    fn test_cancel_wakes_blocked() {
        let (table, _) = recording_table::<5>();
        assert!(table.take_forks(0));
        let t = {
            let table0 = table.clone();
            thread::spawn(move || table0.take_forks(1))
        };
        thread::sleep(Duration::from_millis(100));

        // wait 中の 1 が notify_all で起こされ、false で戻ってくる
        table.cancel();
        assert!(!t.join().unwrap());
        assert_eq!(table.snapshot()[1], State::Thinking);
    }

    #[test]
    fn test_round_trip() {
        let (table, log) = recording_table::<5>();
        assert!(table.take_forks(3));
        table.put_forks(3);
        assert_eq!(table.snapshot(), [State::Thinking; 5]);

        // 3 の遷移列は Hungry -> Eating -> Thinking のちょうど3つ
        let transitions: Vec<State> = log.lock().unwrap().iter().map(|s| s[3]).collect();
        assert_eq!(
            transitions,
            vec![State::Hungry, State::Eating, State::Thinking]
        );
    }

    #[test]
    fn test_invariants_under_full_run() {
        let (table, log) = recording_table::<5>();
        let mut v = Vec::new();
        for i in 0..5 {
            let table0 = table.clone();
            v.push(thread::spawn(move || {
                while table0.is_running() {
                    thread::sleep(Duration::from_millis(1));
                    if !table0.take_forks(i) {
                        break;
                    }
                    thread::sleep(Duration::from_millis(3));
                    table0.put_forks(i);
                }
            }));
        }

        thread::sleep(Duration::from_millis(300));
        table.cancel();
        for t in v {
            t.join().unwrap();
        }

        let log = log.lock().unwrap();
        // デッドロックしていなければ誰かは食べているはず
        assert!(log.iter().any(|s| eating_count(s) > 0));
        for s in log.iter() {
            assert!(no_adjacent_eating(s));
            assert!(eating_count(s) <= 2); // N=5 で同時に食べられるのは高々2人
        }
        assert_eq!(table.snapshot(), [State::Thinking; 5]);
    }
}
