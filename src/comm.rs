//! Communication contexts
//!
//! [SingleProcess] runs everything on one process, [ThreadGroup] emulates a
//! group of processes with threads of the current process and, with the `mpi`
//! feature, [MpiCollective] wraps an MPI communicator.
use crate::traits::{Collective, Exchange};
use crate::types::{HMatrixError, Result};
use std::any::Any;
use std::ops::AddAssign;
use std::sync::{Arc, Barrier, Mutex};

fn check_counts(
    rank: usize,
    counts: &[usize],
    size: usize,
    local: usize,
    output: usize,
) -> Result<()> {
    if counts.len() != size {
        return Err(HMatrixError::PartitionMismatch(format!(
            "{} counts given for {} processes.",
            counts.len(),
            size
        )));
    }
    if counts[rank] != local {
        return Err(HMatrixError::PartitionMismatch(format!(
            "Process {} contributes {} entries but {} are expected.",
            rank, local, counts[rank]
        )));
    }
    if counts.iter().sum::<usize>() != output {
        return Err(HMatrixError::InvalidInput(format!(
            "Output of length {} cannot hold {} entries.",
            output,
            counts.iter().sum::<usize>()
        )));
    }
    Ok(())
}

/// The trivial group made of the calling process only.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleProcess;

impl Collective for SingleProcess {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }
}

impl<T: Copy> Exchange<T> for SingleProcess {
    fn all_gather_varcount(&self, local: &[T], counts: &[usize], output: &mut [T]) -> Result<()> {
        check_counts(0, counts, 1, local.len(), output.len())?;
        output.copy_from_slice(local);
        Ok(())
    }

    fn all_reduce_sum(&self, _buffer: &mut [T]) -> Result<()> {
        Ok(())
    }

    fn broadcast(&self, root: usize, _buffer: &mut Vec<T>) -> Result<()> {
        if root != 0 {
            return Err(HMatrixError::InvalidInput(format!(
                "Cannot broadcast from process {root} in a group of one."
            )));
        }
        Ok(())
    }
}

type Slot = Option<Box<dyn Any + Send>>;

struct Shared {
    barrier: Barrier,
    slots: Mutex<Vec<Slot>>,
}

/// A group of ranks living on threads of the current process.
///
/// Every member must be moved to its own thread. Collective calls are
/// synchronised with a barrier and exchange data through shared slots.
pub struct ThreadGroup {
    rank: usize,
    size: usize,
    shared: Arc<Shared>,
}

impl ThreadGroup {
    /// Create the `size` members of a new group, ordered by rank.
    pub fn new(size: usize) -> Vec<Self> {
        assert!(size > 0, "A group needs at least one member.");
        let shared = Arc::new(Shared {
            barrier: Barrier::new(size),
            slots: Mutex::new((0..size).map(|_| None).collect()),
        });
        (0..size)
            .map(|rank| Self {
                rank,
                size,
                shared: Arc::clone(&shared),
            })
            .collect()
    }

    /// Publish `value`, then run `read` on the slots of all members.
    ///
    /// Both barriers are always passed, so an error on one member never
    /// leaves its peers waiting.
    fn exchange<V: Any + Send, R>(
        &self,
        value: V,
        read: impl FnOnce(&[Slot]) -> Result<R>,
    ) -> Result<R> {
        let published = match self.shared.slots.lock() {
            Ok(mut slots) => {
                slots[self.rank] = Some(Box::new(value));
                Ok(())
            }
            Err(_) => Err(HMatrixError::CollectiveTransportFailure(
                "A member of the thread group panicked.".to_string(),
            )),
        };
        self.shared.barrier.wait();
        let result = match self.shared.slots.lock() {
            Ok(slots) => published.and_then(|_| read(&slots)),
            Err(_) => Err(HMatrixError::CollectiveTransportFailure(
                "A member of the thread group panicked.".to_string(),
            )),
        };
        self.shared.barrier.wait();
        result
    }
}

fn slot_as<T: 'static>(slots: &[Slot], rank: usize) -> Result<&Vec<T>> {
    slots[rank]
        .as_ref()
        .and_then(|slot| slot.downcast_ref::<Vec<T>>())
        .ok_or_else(|| {
            HMatrixError::CollectiveTransportFailure(format!(
                "Process {rank} entered a different collective operation."
            ))
        })
}

impl Collective for ThreadGroup {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }
}

impl<T: Copy + Send + AddAssign + 'static> Exchange<T> for ThreadGroup {
    fn all_gather_varcount(&self, local: &[T], counts: &[usize], output: &mut [T]) -> Result<()> {
        let checked = check_counts(self.rank, counts, self.size, local.len(), output.len());
        self.exchange(local.to_vec(), |slots| {
            checked?;
            let mut displacement = 0;
            for (rank, count) in counts.iter().enumerate() {
                let data = slot_as::<T>(slots, rank)?;
                if data.len() != *count {
                    return Err(HMatrixError::PartitionMismatch(format!(
                        "Process {} sent {} entries but {} were expected.",
                        rank,
                        data.len(),
                        count
                    )));
                }
                output[displacement..displacement + count].copy_from_slice(data);
                displacement += count;
            }
            Ok(())
        })
    }

    fn all_reduce_sum(&self, buffer: &mut [T]) -> Result<()> {
        self.exchange(buffer.to_vec(), |slots| {
            for rank in 0..self.size {
                if slot_as::<T>(slots, rank)?.len() != buffer.len() {
                    return Err(HMatrixError::PartitionMismatch(format!(
                        "Process {rank} reduces a buffer of a different length."
                    )));
                }
            }
            // Same summation order on every member.
            buffer.copy_from_slice(slot_as::<T>(slots, 0)?);
            for rank in 1..self.size {
                for (value, other) in buffer.iter_mut().zip(slot_as::<T>(slots, rank)?) {
                    *value += *other;
                }
            }
            Ok(())
        })
    }

    fn broadcast(&self, root: usize, buffer: &mut Vec<T>) -> Result<()> {
        if root >= self.size {
            return Err(HMatrixError::InvalidInput(format!(
                "Cannot broadcast from process {} in a group of {}.",
                root, self.size
            )));
        }
        let published = if self.rank == root {
            buffer.clone()
        } else {
            Vec::new()
        };
        self.exchange(published, |slots| {
            if self.rank != root {
                *buffer = slot_as::<T>(slots, root)?.clone();
            }
            Ok(())
        })
    }
}

#[cfg(feature = "mpi")]
mod mpi_collective {
    use super::check_counts;
    use crate::traits::{Collective, Exchange};
    use crate::types::{HMatrixError, Result};
    use mpi::datatype::PartitionMut;
    use mpi::traits::{Communicator, CommunicatorCollectives, Equivalence, Root};
    use mpi::Count;
    use std::ops::AddAssign;

    /// Collective operations over an MPI communicator.
    pub struct MpiCollective<'a, C: Communicator> {
        comm: &'a C,
    }

    impl<'a, C: Communicator> MpiCollective<'a, C> {
        /// Wrap a communicator.
        pub fn new(comm: &'a C) -> Self {
            Self { comm }
        }

        /// The wrapped communicator
        pub fn communicator(&self) -> &C {
            self.comm
        }
    }

    fn to_count(n: usize) -> Result<Count> {
        Count::try_from(n).map_err(|_| {
            HMatrixError::CollectiveTransportFailure(format!(
                "{n} entries exceed the MPI count range."
            ))
        })
    }

    impl<C: Communicator> Collective for MpiCollective<'_, C> {
        fn rank(&self) -> usize {
            self.comm.rank() as usize
        }

        fn size(&self) -> usize {
            self.comm.size() as usize
        }
    }

    impl<C: Communicator, T: Equivalence + Copy + Default + AddAssign> Exchange<T>
        for MpiCollective<'_, C>
    {
        fn all_gather_varcount(
            &self,
            local: &[T],
            counts: &[usize],
            output: &mut [T],
        ) -> Result<()> {
            check_counts(self.rank(), counts, self.size(), local.len(), output.len())?;
            let counts = counts
                .iter()
                .map(|c| to_count(*c))
                .collect::<Result<Vec<_>>>()?;
            let displs: Vec<Count> = counts
                .iter()
                .scan(0, |acc, &x| {
                    let tmp = *acc;
                    *acc += x;
                    Some(tmp)
                })
                .collect();
            let mut partition = PartitionMut::new(output, counts, &displs[..]);
            self.comm.all_gather_varcount_into(local, &mut partition);
            Ok(())
        }

        fn all_reduce_sum(&self, buffer: &mut [T]) -> Result<()> {
            // Gather and sum in rank order so all processes agree bitwise.
            let n = buffer.len();
            let mut all = vec![T::default(); n * self.size()];
            self.comm.all_gather_into(&buffer[..], &mut all[..]);
            buffer.copy_from_slice(&all[..n]);
            for chunk in all[n..].chunks_exact(n.max(1)) {
                for (value, other) in buffer.iter_mut().zip(chunk) {
                    *value += *other;
                }
            }
            Ok(())
        }

        fn broadcast(&self, root: usize, buffer: &mut Vec<T>) -> Result<()> {
            let root_process = self.comm.process_at_rank(to_count(root)?);
            let mut len = buffer.len();
            root_process.broadcast_into(&mut len);
            buffer.resize(len, T::default());
            root_process.broadcast_into(&mut buffer[..]);
            Ok(())
        }
    }
}

#[cfg(feature = "mpi")]
pub use mpi_collective::MpiCollective;
