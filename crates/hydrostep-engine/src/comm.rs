//! [`Collective`] implementations: a single-rank no-op and an in-process
//! multi-rank group backed by crossbeam channels.

use crossbeam_channel::{unbounded, Receiver, Sender};

use hydrostep_core::{min_or_nan, Collective, CollectiveError};

// ── SerialCollective ───────────────────────────────────────────────

/// A collective over a single rank. Every reduction is the identity.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialCollective;

impl Collective for SerialCollective {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn reduce_min(&mut self, value: f64) -> Result<f64, CollectiveError> {
        Ok(value)
    }

    fn reduce_sum(&mut self, _values: &mut [f64]) -> Result<(), CollectiveError> {
        Ok(())
    }
}

// ── ChannelCollective ──────────────────────────────────────────────

/// One rank of an in-process group whose members run on separate threads.
///
/// Every pair of ranks is connected by a dedicated FIFO channel in each
/// direction. A reduction sends the local contribution to every peer,
/// receives one contribution from each, and combines all of them in rank
/// order, so every rank computes a bit-identical result. All ranks must
/// issue the same sequence of reductions.
///
/// [`abort`](Collective::abort) hangs up every channel of this rank, so
/// peers waiting on it see [`CollectiveError::PeerDisconnected`]. An
/// aborted group cannot be rejoined; build a new one with
/// [`group`](Self::group).
pub struct ChannelCollective {
    rank: usize,
    size: usize,
    /// `None` at this rank's own index, and everywhere after an abort.
    to_peer: Vec<Option<Sender<Vec<f64>>>>,
    from_peer: Vec<Option<Receiver<Vec<f64>>>>,
    aborted: bool,
}

impl ChannelCollective {
    /// Create `size` connected ranks, indexed by rank.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero.
    pub fn group(size: usize) -> Vec<ChannelCollective> {
        assert!(size > 0, "a collective group needs at least one rank");
        let mut members: Vec<ChannelCollective> = (0..size)
            .map(|rank| ChannelCollective {
                rank,
                size,
                to_peer: (0..size).map(|_| None).collect(),
                from_peer: (0..size).map(|_| None).collect(),
                aborted: false,
            })
            .collect();
        for src in 0..size {
            for dst in 0..size {
                if src != dst {
                    let (tx, rx) = unbounded();
                    members[src].to_peer[dst] = Some(tx);
                    members[dst].from_peer[src] = Some(rx);
                }
            }
        }
        members
    }

    /// Exchange `local` with every peer; returns all contributions indexed
    /// by rank.
    fn all_gather(&mut self, local: Vec<f64>) -> Result<Vec<Vec<f64>>, CollectiveError> {
        if self.aborted {
            return Err(CollectiveError::Aborted { rank: self.rank });
        }
        for (peer, tx) in self.to_peer.iter().enumerate() {
            if let Some(tx) = tx {
                tx.send(local.clone())
                    .map_err(|_| CollectiveError::PeerDisconnected {
                        rank: self.rank,
                        peer,
                    })?;
            }
        }
        let mut gathered = Vec::with_capacity(self.size);
        for (peer, rx) in self.from_peer.iter().enumerate() {
            match rx {
                Some(rx) => {
                    let contribution =
                        rx.recv().map_err(|_| CollectiveError::PeerDisconnected {
                            rank: self.rank,
                            peer,
                        })?;
                    if contribution.len() != local.len() {
                        return Err(CollectiveError::LengthMismatch {
                            expected: local.len(),
                            received: contribution.len(),
                        });
                    }
                    gathered.push(contribution);
                }
                None => gathered.push(local.clone()),
            }
        }
        Ok(gathered)
    }
}

impl Collective for ChannelCollective {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn reduce_min(&mut self, value: f64) -> Result<f64, CollectiveError> {
        let gathered = self.all_gather(vec![value])?;
        Ok(gathered
            .iter()
            .map(|c| c[0])
            .fold(f64::INFINITY, min_or_nan))
    }

    fn reduce_sum(&mut self, values: &mut [f64]) -> Result<(), CollectiveError> {
        let gathered = self.all_gather(values.to_vec())?;
        for (k, v) in values.iter_mut().enumerate() {
            *v = gathered.iter().map(|c| c[k]).sum();
        }
        Ok(())
    }

    fn abort(&mut self) {
        self.aborted = true;
        self.to_peer.iter_mut().for_each(|tx| *tx = None);
        self.from_peer.iter_mut().for_each(|rx| *rx = None);
    }
}

impl std::fmt::Debug for ChannelCollective {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelCollective")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .field("aborted", &self.aborted)
            .finish()
    }
}
