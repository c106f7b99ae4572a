use std::sync::{Condvar, Mutex};

// カウンティングセマフォ
// カウンタが max に達している間、wait はブロックする
// max = 1 で作ればただの排他ロックとして使える
pub struct Semaphore {
    mutex: Mutex<isize>,
    cond: Condvar,
    max: isize,
}

impl Semaphore {
    pub fn new(max: isize) -> Self {
        assert!(max > 0);
        Semaphore {
            mutex: Mutex::new(0),
            cond: Condvar::new(),
            max,
        }
    }

    pub fn wait(&self) {
        // カウンタが max 以上なら空きが出るまで待つ
        let mut cnt = self.mutex.lock().unwrap();
        while *cnt >= self.max {
            cnt = self.cond.wait(cnt).unwrap();
        }
        *cnt += 1;
    }

    pub fn post(&self) {
        let mut cnt = self.mutex.lock().unwrap();
        *cnt -= 1;
        if *cnt <= self.max {
            self.cond.notify_one();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };
    use std::thread;

    const NUM_THREADS: usize = 8;
    const NUM_LOOP: usize = 1000;

    #[test]
    fn test_at_most_max_holders() {
        let sem = Arc::new(Semaphore::new(2));
        let inside = Arc::new(AtomicUsize::new(0));
        let mut v = Vec::new();
        for _ in 0..NUM_THREADS {
            let sem0 = sem.clone();
            let inside0 = inside.clone();
            v.push(thread::spawn(move || {
                for _ in 0..NUM_LOOP {
                    sem0.wait();
                    // 同時に区間内にいられるのは max 人まで
                    let n = inside0.fetch_add(1, Ordering::SeqCst);
                    assert!(n < 2);
                    inside0.fetch_sub(1, Ordering::SeqCst);
                    sem0.post();
                }
            }));
        }
        for t in v {
            t.join().unwrap();
        }
    }
}
