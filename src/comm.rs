use log::trace;
use std::sync::{Arc, Barrier, Mutex};

/// Which worker takes the convergence decisions and writes the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Coordinator,
    Worker,
}

impl Role {
    /// Rank 0 coordinates.
    pub fn from_rank(rank: usize) -> Self {
        if rank == 0 {
            Role::Coordinator
        } else {
            Role::Worker
        }
    }
}

/// Message passing between the independent Markov chains of one loop.
/// Every call is collective, all ranks must make it in the same order.
pub trait Communicator {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;
    fn barrier(&self);
    /// Value of `root` on every rank.
    fn broadcast_flag(&self, root: usize, value: bool) -> bool;
    /// Elementwise mean of `data` over the ranks, written back on every rank.
    fn all_reduce_mean(&self, data: &mut [f64]);
}

/// One process, every collective is trivial.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleProcess;

impl Communicator for SingleProcess {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn barrier(&self) {}

    fn broadcast_flag(&self, _root: usize, value: bool) -> bool {
        value
    }

    fn all_reduce_mean(&self, _data: &mut [f64]) {}
}

struct Shared {
    barrier: Barrier,
    flag: Mutex<bool>,
    slots: Mutex<Vec<Vec<f64>>>,
}

/// Workers living in the same process, one thread per chain.
#[derive(Clone)]
pub struct LocalGroup {
    rank: usize,
    size: usize,
    shared: Arc<Shared>,
}

impl LocalGroup {
    /// One handle per rank, hand one to each thread.
    pub fn new(size: usize) -> Vec<LocalGroup> {
        let size = size.max(1);
        let shared = Arc::new(Shared {
            barrier: Barrier::new(size),
            flag: Mutex::new(false),
            slots: Mutex::new(vec![Vec::new(); size]),
        });
        (0..size)
            .map(|rank| LocalGroup { rank, size, shared: Arc::clone(&shared) })
            .collect()
    }
}

impl Communicator for LocalGroup {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn barrier(&self) {
        self.shared.barrier.wait();
    }

    fn broadcast_flag(&self, root: usize, value: bool) -> bool {
        if self.rank == root {
            // Poisoned locks still hold a valid flag.
            let mut flag = self.shared.flag.lock().unwrap_or_else(|e| e.into_inner());
            *flag = value;
        }
        self.barrier();
        let out = *self.shared.flag.lock().unwrap_or_else(|e| e.into_inner());
        self.barrier();
        trace!("Rank {} received flag {} from {}.", self.rank, out, root);
        out
    }

    fn all_reduce_mean(&self, data: &mut [f64]) {
        {
            let mut slots = self.shared.slots.lock().unwrap_or_else(|e| e.into_inner());
            slots[self.rank] = data.to_vec();
        }
        self.barrier();
        {
            let slots = self.shared.slots.lock().unwrap_or_else(|e| e.into_inner());
            let norm = 1.0 / self.size as f64;
            for (k, x) in data.iter_mut().enumerate() {
                // Same summation order on every rank, bit identical results.
                *x = slots.iter().map(|s| s[k]).sum::<f64>() * norm;
            }
        }
        self.barrier();
    }
}

#[cfg(test)]
mod test {
    use assert::close;

    use super::*;

    #[test]
    fn single_process() {
        let c = SingleProcess;
        let mut data = vec![1.0, 2.0];
        c.all_reduce_mean(&mut data);
        assert_eq!(data, vec![1.0, 2.0]);
        assert!(c.broadcast_flag(0, true));
        assert_eq!(Role::from_rank(c.rank()), Role::Coordinator);
    }

    #[test]
    fn local_group_collectives() {
        let group = LocalGroup::new(4);
        let results: Vec<(Vec<f64>, bool)> = std::thread::scope(|s| {
            let handles: Vec<_> = group
                .into_iter()
                .map(|comm| {
                    s.spawn(move || {
                        let r = comm.rank() as f64;
                        let mut data = vec![r, 2.0 * r];
                        comm.all_reduce_mean(&mut data);
                        let flag = comm.broadcast_flag(0, comm.rank() == 0);
                        let again = comm.broadcast_flag(2, comm.rank() != 2);
                        assert!(!again);
                        (data, flag)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for (data, flag) in results {
            close(data[0], 1.5, 1e-15);
            close(data[1], 3.0, 1e-15);
            assert!(flag);
        }
        assert_eq!(Role::from_rank(3), Role::Worker);
    }
}
