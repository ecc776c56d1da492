use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::{Component, Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::error::{EngineError, EngineResult};

/// Storage capability: hand back the bytes of a named file, optionally only a
/// byte range of it.
pub trait ByteSource: Send + Sync {
    fn read(&self, path: &str, range: Option<Range<u64>>) -> EngineResult<Vec<u8>>;
}

/// Reads files below a local asset root.
#[derive(Debug, Clone)]
pub struct LocalSource {
    root: PathBuf,
}

impl LocalSource {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        LocalSource { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let mut full = self.root.clone();
        for component in Path::new(&path.replace('\\', "/")).components() {
            if let Component::Normal(part) = component {
                full.push(part);
            }
        }
        full
    }
}

impl ByteSource for LocalSource {
    fn read(&self, path: &str, range: Option<Range<u64>>) -> EngineResult<Vec<u8>> {
        let full = self.resolve(path);
        let mut file = File::open(&full)
            .map_err(|err| EngineError::fetch(path, format!("{}: {err}", full.display())))?;

        let Some(range) = range else {
            let mut buffer = Vec::new();
            file.read_to_end(&mut buffer)
                .map_err(|err| EngineError::fetch(path, err))?;
            return Ok(buffer);
        };

        let length = range
            .end
            .checked_sub(range.start)
            .ok_or_else(|| EngineError::fetch(path, "inverted byte range"))?;
        file.seek(SeekFrom::Start(range.start))
            .map_err(|err| EngineError::fetch(path, err))?;
        let mut buffer = vec![0u8; length as usize];
        file.read_exact(&mut buffer).map_err(|err| {
            EngineError::fetch(path, format!("short read of {length} bytes: {err}"))
        })?;
        Ok(buffer)
    }
}

/// In-memory file table. Used by tests and by tooling that already holds the
/// archives in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: HashMap<String, Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<S: Into<String>>(&mut self, path: S, bytes: Vec<u8>) {
        self.files.insert(path.into(), bytes);
    }

    pub fn with<S: Into<String>>(mut self, path: S, bytes: Vec<u8>) -> Self {
        self.insert(path, bytes);
        self
    }
}

impl ByteSource for MemorySource {
    fn read(&self, path: &str, range: Option<Range<u64>>) -> EngineResult<Vec<u8>> {
        let data = self
            .files
            .get(path)
            .ok_or_else(|| EngineError::fetch(path, "no such file"))?;
        let Some(range) = range else {
            return Ok(data.clone());
        };
        let start = range.start as usize;
        let end = range.end as usize;
        data.get(start..end).map(<[u8]>::to_vec).ok_or_else(|| {
            EngineError::fetch(
                path,
                format!("range {start}..{end} exceeds {} bytes", data.len()),
            )
        })
    }
}

/// Fetches files from a web server, sending a `Range` header for partial reads.
#[cfg(feature = "network")]
pub struct HttpSource {
    base_url: String,
    client: reqwest::blocking::Client,
}

#[cfg(feature = "network")]
impl HttpSource {
    pub fn new<S: Into<String>>(base_url: S) -> EngineResult<Self> {
        let base_url = base_url.into();
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|err| EngineError::fetch(&base_url, format!("http client init: {err}")))?;
        Ok(HttpSource { base_url, client })
    }
}

#[cfg(feature = "network")]
impl ByteSource for HttpSource {
    fn read(&self, path: &str, range: Option<Range<u64>>) -> EngineResult<Vec<u8>> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        let mut request = self.client.get(&url);
        if let Some(range) = range.as_ref() {
            if range.is_empty() {
                return Ok(Vec::new());
            }
            request = request.header(
                reqwest::header::RANGE,
                format!("bytes={}-{}", range.start, range.end - 1),
            );
        }

        let response = request
            .send()
            .map_err(|err| EngineError::fetch(path, err))?;
        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::fetch(path, format!("{status}: {url}")));
        }
        let body = response
            .bytes()
            .map_err(|err| EngineError::fetch(path, err))?
            .to_vec();

        match range {
            // Server ignored the Range header and sent the whole file.
            Some(range) if status != reqwest::StatusCode::PARTIAL_CONTENT => body
                .get(range.start as usize..range.end as usize)
                .map(<[u8]>::to_vec)
                .ok_or_else(|| EngineError::fetch(path, "range exceeds response body")),
            _ => Ok(body),
        }
    }
}

/// Transformation run on the fetched bytes before the completion is queued,
/// on whichever thread performed the read.
pub type PostProcess = Box<dyn FnOnce(Vec<u8>) -> EngineResult<Vec<u8>> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Read synchronously while issuing; the completion is queued at once.
    Inline,
    /// Hand reads to a pool of background threads.
    Workers(usize),
    /// Park requests until they are released explicitly.
    Deferred,
}

/// A delivered fetch: the bytes plus the context the caller attached.
#[derive(Debug)]
pub struct Completion<C> {
    pub path: String,
    pub context: C,
    pub bytes: Vec<u8>,
}

struct Request<C> {
    path: String,
    range: Option<Range<u64>>,
    context: C,
    post: Option<PostProcess>,
}

enum Outcome<C> {
    Delivered(Completion<C>),
    Dropped,
}

impl<C> Request<C> {
    fn execute(self, source: &dyn ByteSource) -> Outcome<C> {
        let Request {
            path,
            range,
            context,
            post,
        } = self;

        let bytes = match source.read(&path, range) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!("dropping fetch: {err}");
                return Outcome::Dropped;
            }
        };
        let bytes = match post {
            Some(post) => match post(bytes) {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!("dropping fetch of {path}: {err}");
                    return Outcome::Dropped;
                }
            },
            None => bytes,
        };

        debug!("fetched {path} ({} bytes)", bytes.len());
        Outcome::Delivered(Completion {
            path,
            context,
            bytes,
        })
    }
}

enum Mode<C> {
    Inline,
    Workers {
        jobs: Option<Sender<Request<C>>>,
        handles: Vec<JoinHandle<()>>,
    },
    Deferred {
        parked: Vec<Request<C>>,
    },
}

/// Front end for every asset read. Each request yields at most one
/// [`Completion`]; failed reads are logged and yield nothing. Completions are
/// collected on the owning thread through [`FetchPipeline::poll`], in whatever
/// order the reads finished.
pub struct FetchPipeline<C> {
    source: Arc<dyn ByteSource>,
    mode: Mode<C>,
    outcomes_tx: Sender<Outcome<C>>,
    outcomes_rx: Receiver<Outcome<C>>,
    in_flight: usize,
}

impl<C: Send + 'static> FetchPipeline<C> {
    pub fn new(source: Arc<dyn ByteSource>, dispatch: Dispatch) -> Self {
        let (outcomes_tx, outcomes_rx) = mpsc::channel();
        let mode = match dispatch {
            Dispatch::Inline => Mode::Inline,
            Dispatch::Deferred => Mode::Deferred { parked: Vec::new() },
            Dispatch::Workers(count) => spawn_workers(&source, &outcomes_tx, count.max(1)),
        };
        FetchPipeline {
            source,
            mode,
            outcomes_tx,
            outcomes_rx,
            in_flight: 0,
        }
    }

    pub fn fetch<S: Into<String>>(&mut self, path: S, range: Option<Range<u64>>, context: C) {
        self.submit(Request {
            path: path.into(),
            range,
            context,
            post: None,
        });
    }

    pub fn fetch_with<S, F>(&mut self, path: S, range: Option<Range<u64>>, context: C, post: F)
    where
        S: Into<String>,
        F: FnOnce(Vec<u8>) -> EngineResult<Vec<u8>> + Send + 'static,
    {
        self.submit(Request {
            path: path.into(),
            range,
            context,
            post: Some(Box::new(post)),
        });
    }

    fn submit(&mut self, request: Request<C>) {
        debug!("fetch {} {:?}", request.path, request.range);
        self.in_flight += 1;
        match &mut self.mode {
            Mode::Inline => {
                let outcome = request.execute(self.source.as_ref());
                let _ = self.outcomes_tx.send(outcome);
            }
            Mode::Workers { jobs, .. } => {
                let returned = match jobs.as_ref() {
                    Some(jobs) => jobs.send(request).err().map(|err| err.0),
                    None => Some(request),
                };
                // Every worker has exited; read on this thread instead.
                if let Some(request) = returned {
                    let outcome = request.execute(self.source.as_ref());
                    let _ = self.outcomes_tx.send(outcome);
                }
            }
            Mode::Deferred { parked } => parked.push(request),
        }
    }

    /// Drains every completion that has arrived so far without blocking.
    pub fn poll(&mut self) -> Vec<Completion<C>> {
        let mut delivered = Vec::new();
        while let Ok(outcome) = self.outcomes_rx.try_recv() {
            self.settle(outcome, &mut delivered);
        }
        delivered
    }

    /// Blocks until every unparked request has settled or the timeout passes.
    pub fn wait(&mut self, timeout: Duration) -> Vec<Completion<C>> {
        let deadline = Instant::now() + timeout;
        let mut delivered = self.poll();
        while self.in_flight > self.parked() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.outcomes_rx.recv_timeout(remaining) {
                Ok(outcome) => self.settle(outcome, &mut delivered),
                Err(_) => break,
            }
        }
        delivered
    }

    fn settle(&mut self, outcome: Outcome<C>, delivered: &mut Vec<Completion<C>>) {
        self.in_flight = self.in_flight.saturating_sub(1);
        if let Outcome::Delivered(completion) = outcome {
            delivered.push(completion);
        }
    }

    /// Requests issued but not yet settled, parked ones included.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn parked(&self) -> usize {
        match &self.mode {
            Mode::Deferred { parked } => parked.len(),
            _ => 0,
        }
    }

    pub fn parked_paths(&self) -> Vec<&str> {
        match &self.mode {
            Mode::Deferred { parked } => parked.iter().map(|request| request.path.as_str()).collect(),
            _ => Vec::new(),
        }
    }

    /// Runs the oldest parked request for `path`. Returns false when nothing
    /// for that path is parked.
    pub fn release(&mut self, path: &str) -> bool {
        let Mode::Deferred { parked } = &mut self.mode else {
            return false;
        };
        let Some(index) = parked.iter().position(|request| request.path == path) else {
            return false;
        };
        let request = parked.remove(index);
        let outcome = request.execute(self.source.as_ref());
        let _ = self.outcomes_tx.send(outcome);
        true
    }

    pub fn release_all(&mut self) -> usize {
        let Mode::Deferred { parked } = &mut self.mode else {
            return 0;
        };
        let requests: Vec<Request<C>> = parked.drain(..).collect();
        let count = requests.len();
        for request in requests {
            let outcome = request.execute(self.source.as_ref());
            let _ = self.outcomes_tx.send(outcome);
        }
        count
    }
}

fn spawn_workers<C: Send + 'static>(
    source: &Arc<dyn ByteSource>,
    outcomes: &Sender<Outcome<C>>,
    count: usize,
) -> Mode<C> {
    let (jobs_tx, jobs_rx) = mpsc::channel::<Request<C>>();
    let jobs_rx = Arc::new(Mutex::new(jobs_rx));
    let mut handles = Vec::with_capacity(count);
    for index in 0..count {
        let jobs = Arc::clone(&jobs_rx);
        let outcomes = outcomes.clone();
        let source = Arc::clone(source);
        let spawned = thread::Builder::new()
            .name(format!("fs2-fetch-{index}"))
            .spawn(move || worker_loop(source.as_ref(), &jobs, &outcomes));
        match spawned {
            Ok(handle) => handles.push(handle),
            Err(err) => warn!("failed to spawn fetch worker {index}: {err}"),
        }
    }
    if handles.is_empty() {
        warn!("no fetch workers available; reading inline");
        return Mode::Inline;
    }
    Mode::Workers {
        jobs: Some(jobs_tx),
        handles,
    }
}

fn worker_loop<C>(
    source: &dyn ByteSource,
    jobs: &Mutex<Receiver<Request<C>>>,
    outcomes: &Sender<Outcome<C>>,
) {
    loop {
        let request = {
            let Ok(queue) = jobs.lock() else {
                return;
            };
            match queue.recv() {
                Ok(request) => request,
                Err(_) => return,
            }
        };
        if outcomes.send(request.execute(source)).is_err() {
            return;
        }
    }
}

impl<C> Drop for FetchPipeline<C> {
    fn drop(&mut self) {
        if let Mode::Workers { jobs, handles } = &mut self.mode {
            jobs.take();
            for handle in handles.drain(..) {
                let _ = handle.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn source() -> Arc<dyn ByteSource> {
        Arc::new(
            MemorySource::new()
                .with("data.int", (0u8..32).collect())
                .with("scene/op.cst", b"CatScene".to_vec()),
        )
    }

    #[test]
    fn inline_fetch_completes_once_with_context() {
        let mut pipeline = FetchPipeline::new(source(), Dispatch::Inline);
        pipeline.fetch("data.int", Some(4..8), "slot-3");

        let done = pipeline.poll();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].context, "slot-3");
        assert_eq!(done[0].bytes, vec![4, 5, 6, 7]);
        assert!(pipeline.poll().is_empty());
        assert_eq!(pipeline.in_flight(), 0);
    }

    #[test]
    fn failed_reads_produce_no_completion() {
        let mut pipeline = FetchPipeline::new(source(), Dispatch::Inline);
        pipeline.fetch("missing.int", None, 1);
        pipeline.fetch("data.int", Some(30..40), 2);
        pipeline.fetch_with("data.int", None, 3, |_| {
            Err(EngineError::Codec("bad payload".into()))
        });

        assert!(pipeline.poll().is_empty());
        assert_eq!(pipeline.in_flight(), 0);
    }

    #[test]
    fn post_process_runs_before_delivery() {
        let mut pipeline = FetchPipeline::new(source(), Dispatch::Inline);
        pipeline.fetch_with("data.int", Some(0..4), (), |mut bytes| {
            bytes.reverse();
            Ok(bytes)
        });
        assert_eq!(pipeline.poll()[0].bytes, vec![3, 2, 1, 0]);
    }

    #[test]
    fn deferred_requests_complete_in_release_order() {
        let mut pipeline = FetchPipeline::new(source(), Dispatch::Deferred);
        pipeline.fetch("data.int", Some(0..1), "first");
        pipeline.fetch("scene/op.cst", None, "second");
        assert_eq!(pipeline.parked_paths(), vec!["data.int", "scene/op.cst"]);
        assert!(pipeline.poll().is_empty());

        assert!(pipeline.release("scene/op.cst"));
        assert!(!pipeline.release("scene/op.cst"));
        assert_eq!(pipeline.poll()[0].context, "second");
        assert_eq!(pipeline.release_all(), 1);
        assert_eq!(pipeline.poll()[0].context, "first");
        assert_eq!(pipeline.in_flight(), 0);
    }

    #[test]
    fn worker_pool_delivers_every_request() {
        let mut pipeline = FetchPipeline::new(source(), Dispatch::Workers(3));
        for index in 0..16u64 {
            pipeline.fetch("data.int", Some(index..index + 1), index);
        }
        pipeline.fetch("missing.int", None, 99);

        let mut done = pipeline.wait(Duration::from_secs(10));
        assert_eq!(pipeline.in_flight(), 0);
        done.sort_by_key(|completion| completion.context);
        assert_eq!(done.len(), 16);
        for (index, completion) in done.iter().enumerate() {
            assert_eq!(completion.bytes, vec![index as u8]);
        }
    }

    #[test]
    fn local_source_reads_ranges_below_root() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("scene")).unwrap();
        fs::write(dir.path().join("scene/op.cst"), b"0123456789").unwrap();

        let local = LocalSource::new(dir.path());
        assert_eq!(local.read("scene/op.cst", Some(2..5)).unwrap(), b"234");
        assert_eq!(local.read("../scene/op.cst", None).unwrap().len(), 10);
        assert!(matches!(
            local.read("scene/op.cst", Some(8..20)),
            Err(EngineError::Fetch { .. })
        ));
        assert!(local.read("scene/none.cst", None).is_err());
    }
}
