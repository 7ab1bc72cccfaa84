use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Barrier, Mutex};

use mg_types::RankId;

use crate::errors::TransportError;
use crate::Transport;

/// In-process stand-in for a real point-to-point messaging library (MPI, raw TCP,
/// ...): one OS-thread-backed `mpsc` channel per ordered `(src, dst)` pair, so
/// `recv_into(peer, ..)` never has to demultiplex incoming data by sender, and a
/// shared `Barrier` for the collective completion wait. Swapping to a production
/// transport means swapping this one implementation behind `Transport`.
pub struct ChannelTransport {
    my_rank: RankId,
    n_ranks: usize,
    senders: Vec<Option<Sender<Vec<f64>>>>,
    receivers: Vec<Option<Mutex<Receiver<Vec<f64>>>>>,
    barrier: Arc<Barrier>,
}

impl ChannelTransport {
    /// Builds a fully connected mesh of channels for `n_ranks` simulated ranks and
    /// returns one `ChannelTransport` per rank, index-aligned with the rank id.
    pub fn cluster(n_ranks: usize) -> Vec<ChannelTransport> {
        assert!(n_ranks > 0, "a cluster needs at least one rank");

        let mut senders: Vec<Vec<Option<Sender<Vec<f64>>>>> =
            (0..n_ranks).map(|_| (0..n_ranks).map(|_| None).collect()).collect();
        let mut receivers: Vec<Vec<Option<Receiver<Vec<f64>>>>> =
            (0..n_ranks).map(|_| (0..n_ranks).map(|_| None).collect()).collect();

        for src in 0..n_ranks {
            for dst in 0..n_ranks {
                if src == dst {
                    continue;
                }
                let (tx, rx) = channel();
                senders[src][dst] = Some(tx);
                receivers[dst][src] = Some(rx);
            }
        }

        let barrier = Arc::new(Barrier::new(n_ranks));
        (0..n_ranks)
            .map(|rank| ChannelTransport {
                my_rank: rank as RankId,
                n_ranks,
                senders: std::mem::take(&mut senders[rank]),
                receivers: std::mem::take(&mut receivers[rank])
                    .into_iter()
                    .map(|maybe_rx| maybe_rx.map(Mutex::new))
                    .collect(),
                barrier: barrier.clone(),
            })
            .collect()
    }
}

impl Transport for ChannelTransport {
    fn send(&self, peer: RankId, bytes: &[f64]) -> Result<(), TransportError> {
        let sender = self
            .senders
            .get(peer as usize)
            .and_then(Option::as_ref)
            .ok_or(TransportError::UnknownPeer(peer))?;
        sender
            .send(bytes.to_vec())
            .map_err(|_| TransportError::ChannelClosed(peer))
    }

    fn recv_into(&self, peer: RankId, out: &mut [f64]) -> Result<(), TransportError> {
        let receiver = self
            .receivers
            .get(peer as usize)
            .and_then(Option::as_ref)
            .ok_or(TransportError::UnknownPeer(peer))?;
        let guard = receiver.lock().expect("receiver mutex poisoned");
        let data = guard.recv().map_err(|_| TransportError::ChannelClosed(peer))?;
        if data.len() != out.len() {
            return Err(TransportError::SizeMismatch {
                peer,
                expected: out.len(),
                received: data.len(),
            });
        }
        out.copy_from_slice(&data);
        Ok(())
    }

    fn barrier(&self) -> Result<(), TransportError> {
        self.barrier.wait();
        Ok(())
    }

    fn my_rank(&self) -> RankId {
        self.my_rank
    }

    fn n_ranks(&self) -> usize {
        self.n_ranks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn send_recv_roundtrip_across_threads() {
        let mut cluster = ChannelTransport::cluster(2);
        let rank1 = cluster.pop().unwrap();
        let rank0 = cluster.pop().unwrap();

        let sender = thread::spawn(move || {
            rank0.send(1, &[1.0, 2.0, 3.0]).unwrap();
            rank0.barrier().unwrap();
        });
        let receiver = thread::spawn(move || {
            let mut out = [0.0; 3];
            rank1.recv_into(0, &mut out).unwrap();
            rank1.barrier().unwrap();
            out
        });

        sender.join().unwrap();
        let received = receiver.join().unwrap();
        assert_eq!(received, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn size_mismatch_is_reported() {
        let mut cluster = ChannelTransport::cluster(2);
        let rank1 = cluster.pop().unwrap();
        let rank0 = cluster.pop().unwrap();

        let sender = thread::spawn(move || {
            rank0.send(1, &[1.0, 2.0, 3.0]).unwrap();
        });
        sender.join().unwrap();

        let mut out = [0.0; 2];
        let err = rank1.recv_into(0, &mut out).unwrap_err();
        assert!(matches!(err, TransportError::SizeMismatch { .. }));
    }
}
