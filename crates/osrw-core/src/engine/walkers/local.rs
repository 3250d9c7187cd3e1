use super::{CommError, Observation, WalkerComm};
use parking_lot::Mutex;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Barrier};
use std::time::Duration;

/// An in-process world of walkers, one endpoint per walker thread.
pub struct LocalWorld;

impl LocalWorld {
    /// Creates `size` connected endpoints; endpoint `i` has rank `i`.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero.
    pub fn new(size: usize) -> Vec<LocalEndpoint> {
        assert!(size > 0, "a walker world needs at least one walker");
        let (senders, receivers): (Vec<Sender<Observation>>, Vec<Receiver<Observation>>) =
            (0..size).map(|_| mpsc::channel()).unzip();
        let table = Arc::new(GatherTable {
            slots: Mutex::new(vec![None; size]),
            barrier: Barrier::new(size),
        });

        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| LocalEndpoint {
                rank,
                peers: senders.clone(),
                inbox: Mutex::new(inbox),
                table: Arc::clone(&table),
            })
            .collect()
    }

    /// A world containing only the calling walker.
    pub fn single() -> LocalEndpoint {
        let mut endpoints = Self::new(1);
        endpoints.remove(0)
    }
}

struct GatherTable {
    slots: Mutex<Vec<Option<Observation>>>,
    barrier: Barrier,
}

pub struct LocalEndpoint {
    rank: usize,
    peers: Vec<Sender<Observation>>,
    inbox: Mutex<Receiver<Observation>>,
    table: Arc<GatherTable>,
}

impl WalkerComm for LocalEndpoint {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn all_gather(&self, observation: Observation) -> Result<Vec<Observation>, CommError> {
        self.table.slots.lock()[self.rank] = Some(observation);
        self.table.barrier.wait();
        // Every slot is written before the first barrier and read before the second, so
        // the next round cannot overwrite a slot that is still being read.
        let gathered: Result<Vec<Observation>, CommError> = self
            .table
            .slots
            .lock()
            .iter()
            .enumerate()
            .map(|(rank, slot)| {
                slot.ok_or_else(|| {
                    CommError::Collective(format!("walker {rank} contributed nothing"))
                })
            })
            .collect();
        self.table.barrier.wait();
        gathered
    }

    fn send(&self, to: usize, observation: Observation) -> Result<(), CommError> {
        let peer = self.peers.get(to).ok_or(CommError::InvalidRank {
            rank: to,
            size: self.peers.len(),
        })?;
        peer.send(observation)
            .map_err(|_| CommError::Disconnected { rank: to })
    }

    fn receive(&self, timeout: Duration) -> Result<Option<Observation>, CommError> {
        match self.inbox.lock().recv_timeout(timeout) {
            Ok(observation) => Ok(Some(observation)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(CommError::Disconnected { rank: self.rank })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn all_gather_returns_every_observation_in_rank_order() {
        let endpoints = LocalWorld::new(3);

        let results: Vec<Vec<Observation>> = thread::scope(|scope| {
            let handles: Vec<_> = endpoints
                .iter()
                .map(|endpoint| {
                    scope.spawn(move || {
                        let rank = endpoint.rank() as f64;
                        endpoint
                            .all_gather(Observation::new(rank / 10.0, rank))
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        for gathered in results {
            assert_eq!(gathered.len(), 3);
            for (rank, observation) in gathered.iter().enumerate() {
                assert_eq!(observation.flambda, rank as f64);
            }
        }
    }

    #[test]
    fn repeated_all_gathers_do_not_mix_rounds() {
        let endpoints = LocalWorld::new(2);

        thread::scope(|scope| {
            for endpoint in &endpoints {
                scope.spawn(move || {
                    for round in 0..50 {
                        let gathered = endpoint
                            .all_gather(Observation::new(0.5, round as f64))
                            .unwrap();
                        assert!(gathered.iter().all(|o| o.flambda == round as f64));
                    }
                });
            }
        });
    }

    #[test]
    fn send_delivers_to_the_addressed_walker_only() {
        let endpoints = LocalWorld::new(2);

        endpoints[0].send(1, Observation::new(0.25, -3.0)).unwrap();

        let timeout = Duration::from_millis(10);
        assert_eq!(
            endpoints[1].receive(timeout).unwrap(),
            Some(Observation::new(0.25, -3.0))
        );
        assert_eq!(endpoints[0].receive(timeout).unwrap(), None);
        assert_eq!(endpoints[1].receive(timeout).unwrap(), None);
    }

    #[test]
    fn send_to_unknown_rank_fails() {
        let endpoint = LocalWorld::single();

        let result = endpoint.send(4, Observation::new(0.0, 0.0));

        assert_eq!(result, Err(CommError::InvalidRank { rank: 4, size: 1 }));
    }

    #[test]
    fn single_walker_gathers_itself() {
        let endpoint = LocalWorld::single();

        let gathered = endpoint.all_gather(Observation::new(0.1, 2.0)).unwrap();

        assert_eq!(gathered, vec![Observation::new(0.1, 2.0)]);
    }
}
