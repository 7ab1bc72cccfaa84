use mg_types::RankId;

use crate::errors::TransportError;
use crate::Transport;

/// Cursor-only tracker used by the ghost engine's two-pass dry-run sizing (§4.2.1 of
/// the design doc): advances exactly as the real packing pass would, but never touches
/// backing storage, so running it costs nothing beyond a handful of integer adds.
#[derive(Debug)]
pub struct DryRunCounters {
    send: Vec<usize>,
    recv: Vec<usize>,
}

impl DryRunCounters {
    pub fn new(n_ranks: usize) -> Self {
        Self {
            send: vec![0; n_ranks],
            recv: vec![0; n_ranks],
        }
    }

    pub fn reserve_send(&mut self, peer: RankId, n: usize) -> usize {
        let cursor = self.send[peer as usize];
        self.send[peer as usize] += n;
        cursor
    }

    pub fn reserve_recv(&mut self, peer: RankId, n: usize) -> usize {
        let cursor = self.recv[peer as usize];
        self.recv[peer as usize] += n;
        cursor
    }

    pub fn reset_cursors(&mut self) {
        self.send.iter_mut().for_each(|c| *c = 0);
        self.recv.iter_mut().for_each(|c| *c = 0);
    }

    pub fn send_counts(&self) -> &[usize] {
        &self.send
    }

    pub fn recv_counts(&self) -> &[usize] {
        &self.recv
    }

    /// Folds this level's counters into a running per-peer maximum. Block size `B` is
    /// uniform per level so `dsize` never changes across levels, which means the
    /// capacity each peer ultimately needs is just the float-count high-water mark.
    pub fn fold_into_capacity(&self, send_cap: &mut [usize], recv_cap: &mut [usize]) {
        for (cap, &count) in send_cap.iter_mut().zip(&self.send) {
            *cap = (*cap).max(count);
        }
        for (cap, &count) in recv_cap.iter_mut().zip(&self.recv) {
            *cap = (*cap).max(count);
        }
    }
}

struct PeerSlot {
    send: Vec<f64>,
    i_send: usize,
    recv: Vec<f64>,
    i_recv: usize,
    ix: Vec<i64>,
    i_ix: usize,
}

impl PeerSlot {
    fn with_capacity(send_floats: usize, recv_floats: usize, dsize: usize) -> Self {
        let max_records = if dsize == 0 { 0 } else { send_floats / dsize };
        Self {
            send: vec![0.0; send_floats],
            i_send: 0,
            recv: vec![0.0; recv_floats],
            i_recv: 0,
            ix: vec![0; max_records],
            i_ix: 0,
        }
    }
}

/// Per-rank buffer pool: one send/recv/key staging area per remote peer, allocated once
/// from the dry-run sizing pass and reused across every ghost exchange.
pub struct BufferPool {
    my_rank: RankId,
    slots: Vec<PeerSlot>,
}

impl BufferPool {
    /// `cap_send`/`cap_recv` are per-peer float capacities (the dry-run high-water
    /// mark folded across every level); `dsize` is the halo record size in floats.
    pub fn with_capacities(
        my_rank: RankId,
        cap_send: &[usize],
        cap_recv: &[usize],
        dsize: usize,
    ) -> Self {
        let slots = cap_send
            .iter()
            .zip(cap_recv)
            .map(|(&s, &r)| PeerSlot::with_capacity(s, r, dsize))
            .collect();
        Self { my_rank, slots }
    }

    fn is_self(&self, peer: RankId) -> bool {
        peer == self.my_rank
    }

    pub fn reset_cursors(&mut self) {
        for slot in &mut self.slots {
            slot.i_send = 0;
            slot.i_recv = 0;
            slot.i_ix = 0;
        }
    }

    /// Packs one halo record (`values`, `dsize` floats) into `peer`'s send buffer and
    /// tags it with its sort key. Record and key cursors always advance together.
    pub fn push_record(&mut self, peer: RankId, values: &[f64], key: i64) {
        let slot = &mut self.slots[peer as usize];
        let start = slot.i_send;
        slot.send[start..start + values.len()].copy_from_slice(values);
        slot.i_send += values.len();
        slot.ix[slot.i_ix] = key;
        slot.i_ix += 1;
    }

    /// Sets the expected incoming float count for `peer` ahead of `sort_and_transfer`,
    /// computed by the receiver from its own dry-run pass rather than a handshake.
    pub fn set_expected_recv(&mut self, peer: RankId, n_records: usize, dsize: usize) {
        self.slots[peer as usize].i_recv = n_records * dsize;
    }

    /// Consumes the next `dsize` floats from `peer`'s recv buffer, in the canonical
    /// ascending `(owned_block_id, face_index)` order the ghost-fill pass iterates in.
    pub fn take_recv(&mut self, peer: RankId, dsize: usize) -> &[f64] {
        let slot = &mut self.slots[peer as usize];
        let start = slot.i_recv;
        slot.i_recv += dsize;
        &slot.recv[start..start + dsize]
    }

    /// Stable-sorts each peer's send buffer by its tagged keys, then posts sends/recvs
    /// and awaits completion. Provides a total ordering barrier for this exchange but
    /// not across exchanges — see §5 of the design doc.
    #[tracing::instrument(skip(self, transport))]
    pub fn sort_and_transfer(
        &mut self,
        dsize: usize,
        transport: &dyn Transport,
    ) -> Result<(), TransportError> {
        for (peer, slot) in self.slots.iter_mut().enumerate() {
            let peer = peer as RankId;
            if self.my_rank == peer || slot.i_ix <= 1 {
                continue;
            }
            stable_sort_records(&mut slot.send, &slot.ix[..slot.i_ix], dsize);
        }

        for (peer, slot) in self.slots.iter().enumerate() {
            let peer = peer as RankId;
            if self.is_self(peer) || slot.i_send == 0 {
                continue;
            }
            transport.send(peer, &slot.send[..slot.i_send])?;
        }

        for (peer, slot) in self.slots.iter_mut().enumerate() {
            let peer = peer as RankId;
            if peer == self.my_rank || slot.i_recv == 0 {
                continue;
            }
            let n = slot.i_recv;
            transport.recv_into(peer, &mut slot.recv[..n])?;
        }

        transport.barrier()?;
        // Recv cursors are consumed by the ghost-fill pass immediately after this call;
        // reset them back to the start of the freshly-arrived data.
        for slot in &mut self.slots {
            slot.i_recv = 0;
        }
        Ok(())
    }
}

/// Permutes `buf`, viewed as `dsize`-float records, into ascending-`keys` order. Builds
/// a stable index permutation and gathers once rather than swapping records in place.
fn stable_sort_records(buf: &mut [f64], keys: &[i64], dsize: usize) {
    let n_records = keys.len();
    if n_records <= 1 {
        return;
    }
    let mut order: Vec<usize> = (0..n_records).collect();
    order.sort_by_key(|&i| keys[i]);
    if order.iter().enumerate().all(|(i, &o)| i == o) {
        return;
    }
    let mut gathered = Vec::with_capacity(n_records * dsize);
    for &old in &order {
        gathered.extend_from_slice(&buf[old * dsize..old * dsize + dsize]);
    }
    buf[..gathered.len()].copy_from_slice(&gathered);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_records_permutes_by_key() {
        // three records of 2 floats each, out of order keys
        let mut buf = vec![10.0, 11.0, 20.0, 21.0, 30.0, 31.0];
        let keys = [30_i64, 10, 20];
        stable_sort_records(&mut buf, &keys, 2);
        assert_eq!(buf, vec![20.0, 21.0, 30.0, 31.0, 10.0, 11.0]);
    }

    #[test]
    fn sort_records_is_stable_for_ties() {
        let mut buf = vec![1.0, 2.0, 3.0];
        let keys = [5_i64, 5, 1];
        stable_sort_records(&mut buf, &keys, 1);
        assert_eq!(buf, vec![3.0, 1.0, 2.0]);
    }

    #[test]
    fn dry_run_counters_fold_into_high_water_mark() {
        let mut cap_send = vec![0usize; 2];
        let mut cap_recv = vec![0usize; 2];

        let mut lvl1 = DryRunCounters::new(2);
        lvl1.reserve_send(1, 8);
        lvl1.fold_into_capacity(&mut cap_send, &mut cap_recv);

        let mut lvl2 = DryRunCounters::new(2);
        lvl2.reserve_send(1, 24);
        lvl2.fold_into_capacity(&mut cap_send, &mut cap_recv);

        assert_eq!(cap_send, vec![0, 24]);
    }
}
