use crate::archive::{encode_cluster, LayoutWriter};
use crate::config::{Compression, CreatorConfig};
use crate::error::{Result, ZimError};
use bytes::Bytes;
use crossbeam::channel::{bounded, unbounded, Receiver, Sender};
use std::collections::BTreeMap;
use std::thread::{self, JoinHandle};
use tracing::{debug, info};

/// Location of a blob before cluster numbers are known
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobRef {
    /// Open-cluster slot, mapped to a cluster number when the cluster closes
    pub slot: u32,
    pub blob: u32,
}

struct OpenCluster {
    slot: u32,
    blobs: Vec<Bytes>,
    size: usize,
}

struct Job {
    number: u32,
    blobs: Vec<Bytes>,
    compression: Compression,
}

type JobResult = (u32, Result<Vec<u8>>);

/// Groups blobs into clusters and encodes closed clusters on a worker pool
///
/// Blob placement happens on the caller's thread, so the layout does not
/// depend on worker scheduling. Encoded clusters are written in cluster
/// number order through a reorder buffer.
pub struct ClusterManager {
    compression: Compression,
    cluster_size: usize,
    verbose: bool,
    compressed: Option<OpenCluster>,
    uncompressed: Option<OpenCluster>,
    next_slot: u32,
    next_number: u32,
    slot_to_cluster: Vec<Option<u32>>,
    jobs: Option<Sender<Job>>,
    results: Receiver<JobResult>,
    workers: Vec<JoinHandle<()>>,
    ready: BTreeMap<u32, Vec<u8>>,
    in_flight: usize,
    layout: LayoutWriter,
}

impl ClusterManager {
    pub fn new(layout: LayoutWriter, config: &CreatorConfig) -> Result<Self> {
        let (job_tx, job_rx) = bounded::<Job>(config.workers * 2);
        let (result_tx, result_rx) = unbounded::<JobResult>();

        let mut workers = Vec::with_capacity(config.workers);
        for id in 0..config.workers {
            let jobs = job_rx.clone();
            let results = result_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("zim-cluster-{}", id))
                .spawn(move || worker_loop(jobs, results))?;
            workers.push(handle);
        }

        Ok(Self {
            compression: config.compression,
            cluster_size: config.cluster_size,
            verbose: config.verbose,
            compressed: None,
            uncompressed: None,
            next_slot: 0,
            next_number: 0,
            slot_to_cluster: Vec::new(),
            jobs: Some(job_tx),
            results: result_rx,
            workers,
            ready: BTreeMap::new(),
            in_flight: 0,
            layout,
        })
    }

    /// Place `content` in the compressed or uncompressed open cluster
    pub fn add_blob(&mut self, content: Bytes, compress: bool) -> Result<BlobRef> {
        let compress = compress && self.compression != Compression::None;
        let open = if compress {
            &mut self.compressed
        } else {
            &mut self.uncompressed
        };
        let cluster = open.get_or_insert_with(|| {
            let slot = self.next_slot;
            self.next_slot += 1;
            self.slot_to_cluster.push(None);
            OpenCluster {
                slot,
                blobs: Vec::new(),
                size: 0,
            }
        });

        let location = BlobRef {
            slot: cluster.slot,
            blob: cluster.blobs.len() as u32,
        };
        cluster.size += content.len();
        cluster.blobs.push(content);

        if cluster.size >= self.cluster_size {
            self.close_cluster(compress)?;
        }
        Ok(location)
    }

    fn close_cluster(&mut self, compressed: bool) -> Result<()> {
        let open = if compressed {
            self.compressed.take()
        } else {
            self.uncompressed.take()
        };
        let Some(cluster) = open else {
            return Ok(());
        };

        let number = self.next_number;
        self.next_number += 1;
        self.slot_to_cluster[cluster.slot as usize] = Some(number);

        let compression = if compressed {
            self.compression
        } else {
            Compression::None
        };
        let message = "Closing cluster";
        if self.verbose {
            info!(number, blobs = cluster.blobs.len(), size = cluster.size, %compression, "{}", message);
        } else {
            debug!(number, blobs = cluster.blobs.len(), size = cluster.size, %compression, "{}", message);
        }

        let jobs = self
            .jobs
            .as_ref()
            .ok_or_else(|| ZimError::InvalidState("cluster workers already stopped".into()))?;
        jobs.send(Job {
            number,
            blobs: cluster.blobs,
            compression,
        })
        .map_err(|_| ZimError::InvalidState("cluster workers stopped unexpectedly".into()))?;
        self.in_flight += 1;

        self.collect(false)
    }

    /// Gather finished clusters and write every one that is next in order
    fn collect(&mut self, block: bool) -> Result<()> {
        loop {
            let received = if block && self.in_flight > 0 {
                Some(self.results.recv().map_err(|_| {
                    ZimError::InvalidState("cluster workers exited early".into())
                })?)
            } else {
                self.results.try_recv().ok()
            };
            let Some((number, encoded)) = received else {
                break;
            };
            self.in_flight -= 1;
            self.ready.insert(number, encoded?);
            self.write_ready()?;
            if !block {
                continue;
            }
            if self.in_flight == 0 {
                break;
            }
        }
        self.write_ready()
    }

    fn write_ready(&mut self) -> Result<()> {
        loop {
            let next = self.layout.cluster_count();
            let Some(encoded) = self.ready.remove(&next) else {
                return Ok(());
            };
            self.layout.write_cluster(&encoded)?;
        }
    }

    /// Close the open clusters, wait for the workers and hand back the layout
    ///
    /// Returns the layout and, for every slot, its final cluster number.
    pub fn finish(mut self) -> Result<(LayoutWriter, Vec<u32>)> {
        self.close_cluster(true)?;
        self.close_cluster(false)?;
        self.collect(true)?;

        // Dropping the sender ends the worker loops
        self.jobs = None;
        for handle in self.workers.drain(..) {
            handle
                .join()
                .map_err(|_| ZimError::InvalidState("cluster worker panicked".into()))?;
        }

        if !self.ready.is_empty() || self.layout.cluster_count() != self.next_number {
            return Err(ZimError::InvalidState(format!(
                "wrote {} of {} clusters",
                self.layout.cluster_count(),
                self.next_number
            )));
        }

        let slots = self
            .slot_to_cluster
            .iter()
            .map(|n| n.ok_or_else(|| ZimError::InvalidState("cluster slot never closed".into())))
            .collect::<Result<Vec<u32>>>()?;
        Ok((self.layout, slots))
    }
}

fn worker_loop(jobs: Receiver<Job>, results: Sender<JobResult>) {
    for job in jobs {
        let encoded = encode_cluster(&job.blobs, job.compression);
        if results.send((job.number, encoded)).is_err() {
            break;
        }
    }
}
