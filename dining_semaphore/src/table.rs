use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::semaphore::Semaphore;

// 箸が取れたかどうかを待つ側が確認しにいく間隔
// この間隔ごとにキャンセルも観測されるので、無期限に寝たままにはならない
const POLL_INTERVAL: Duration = Duration::from_millis(100);

// 哲学者の状態
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum State {
    Thinking,
    Hungry,
    Eating,
}

// 状態テーブル
// カウント1のセマフォを排他ロックとして使い、UnsafeCell の中の配列を守る
// 哲学者ごとの ready は「箸が取れた」ことを伝える二値シグナル
pub struct Table<const N: usize> {
    lock: Semaphore,
    state: UnsafeCell<[State; N]>,
    ready: [AtomicBool; N],
    running: AtomicBool,
    // 状態が変わるたびにロックを持ったまま呼ばれる観測用フック
    hook: Box<dyn Fn(usize, [State; N]) + Send + Sync>,
}

// state には lock を獲得した区間でしか触らないため共有可能と設定
unsafe impl<const N: usize> Sync for Table<N> {}

impl<const N: usize> Table<N> {
    pub fn new<F>(hook: F) -> Self
    where
        F: Fn(usize, [State; N]) + Send + Sync + 'static,
    {
        Table {
            lock: Semaphore::new(1),
            state: UnsafeCell::new([State::Thinking; N]),
            ready: std::array::from_fn(|_| AtomicBool::new(false)),
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

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // i が食べられるならこの場で Eating に遷移させ、ready を立てる
    // 条件の評価と遷移を同じ排他区間で行うので、片方の箸だけ持つ状態は存在しえない
    // ただし公平性はない。両隣が交互に食べ続けると i はいつまでも飢える可能性がある
    // lock を獲得している間だけ呼ぶこと
    fn grant(&self, state: &mut [State; N], i: usize) {
        if state[i] == State::Hungry
            && state[Self::left(i)] != State::Eating
            && state[Self::right(i)] != State::Eating
        {
            state[i] = State::Eating;
            (self.hook)(i, *state);
            self.ready[i].store(true, Ordering::SeqCst);
        }
    }

    // Hungry を宣言し、箸が取れるまで待つ
    // キャンセルを観測したら状態を片付けて false を返す
    pub fn take_forks(&self, i: usize) -> bool {
        assert!(i < N);
        self.lock.wait();
        if !self.is_running() {
            self.lock.post();
            return false;
        }
        let state = unsafe { &mut *self.state.get() };
        state[i] = State::Hungry;
        (self.hook)(i, *state);
        self.grant(state, i);
        self.lock.post();

        // ロックは持たずに自分の ready だけを一定間隔で確認する
        // シグナルを消費したあとも running を確認してから成功とするので、
        // cancel が立てたシグナルで誤って食事に進むことはない
        loop {
            if self.ready[i].swap(false, Ordering::SeqCst) {
                if self.is_running() {
                    return true;
                }
                break;
            }
            if !self.is_running() {
                break;
            }
            thread::sleep(POLL_INTERVAL);
        }

        // キャンセルされた。grant 済みかもしれないので Thinking に戻し、
        // 自分の退出で隣が飢えないよう両隣を再評価する
        self.lock.wait();
        let state = unsafe { &mut *self.state.get() };
        state[i] = State::Thinking;
        (self.hook)(i, *state);
        self.grant(state, Self::left(i));
        self.grant(state, Self::right(i));
        self.lock.post();
        self.ready[i].store(false, Ordering::SeqCst);
        false
    }

    // 箸を置き、食べられるようになった隣がいればこの場で遷移させて起こす
    pub fn put_forks(&self, i: usize) {
        assert!(i < N);
        self.lock.wait();
        let state = unsafe { &mut *self.state.get() };
        state[i] = State::Thinking;
        (self.hook)(i, *state);
        self.grant(state, Self::left(i));
        self.grant(state, Self::right(i));
        self.lock.post();
    }

    // キャンセル要求。フラグを立ててから全員の ready を立てて起こす
    // ポーリング間隔だけ待てばどのみち観測されるが、立てておけば即起きられる
    pub fn cancel(&self) {
        self.running.store(false, Ordering::SeqCst);
        for r in &self.ready {
            r.store(true, Ordering::SeqCst);
        }
    }

    pub fn snapshot(&self) -> [State; N] {
        self.lock.wait();
        let state = unsafe { *self.state.get() };
        self.lock.post();
        state
    }
}
