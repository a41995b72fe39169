//! The embedding façade: [`ServerBuilder`] configures, [`Server::start`] launches, and
//! [`RunningServer`] is the handle embedders hold onto.
//!
//! This is the typed-Rust reworking of `mklib_init`/`mklib_config`/`mklib_vhost_config`/
//! `mklib_callback_set`/`mklib_start`/`mklib_stop`. A single variadic `mklib_config(ctx, MKC_*, ...)`
//! call becomes a typed builder method per option; the separate init/configure/start calls
//! collapse into a builder-to-running-server pipeline where the type system, not a runtime flag,
//! rules out configuring a server that has already started — `ServerBuilder`'s setters are not
//! present on [`Server`] or [`RunningServer`] at all.

use std::{
    collections::HashMap,
    net::SocketAddr,
    path::PathBuf,
    sync::{atomic::AtomicBool, Arc, Barrier},
    thread::JoinHandle,
    time::Duration,
};

use crossbeam_channel::unbounded;
use rustls::ServerConfig as RustlsServerConfig;
use tracing::info;

use crate::{
    clock::ClockHandle,
    config::Config,
    error::ConfigError,
    listener::{Acceptor, RoundRobinRouter},
    mime::MimeRegistry,
    net::NetioBuilder,
    pipeline::{Callbacks, CloseHook, DataHook, IpCheckHook, Pipeline, UrlCheckHook},
    vhost::{VirtualHost, VirtualHosts},
    worker::{Worker, WorkerStats},
};

/// Builds a [`Server`] from typed configuration calls, the same information Monkey's embedder
/// passed through `mklib_config`/`mklib_vhost_config`/`mklib_callback_set`/`mklib_mimetype_add`.
pub struct ServerBuilder {
    bind_addr: SocketAddr,
    config: Config,
    vhosts: Vec<VirtualHost>,
    callbacks: Callbacks,
    mime: MimeRegistry,
    tls: Option<Arc<RustlsServerConfig>>,
}

impl ServerBuilder {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            config: Config::default(),
            vhosts: Vec::new(),
            callbacks: Callbacks::default(),
            mime: MimeRegistry::new("application/octet-stream"),
            tls: None,
        }
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn keep_alive(mut self, enabled: bool) -> Self {
        self.config.keep_alive = enabled;
        self
    }

    pub fn keep_alive_timeout(mut self, timeout: Duration) -> Self {
        self.config.keep_alive_timeout = timeout;
        self
    }

    pub fn max_keep_alive_requests(mut self, max: u32) -> Self {
        self.config.max_keep_alive_requests = max;
        self
    }

    pub fn max_request_size(mut self, max: usize) -> Self {
        self.config.max_request_size = max;
        self
    }

    pub fn hide_version(mut self, hide: bool) -> Self {
        self.config.hide_version = hide;
        self
    }

    pub fn resume(mut self, enabled: bool) -> Self {
        self.config.resume = enabled;
        self
    }

    pub fn symlink(mut self, allow: bool) -> Self {
        self.config.symlink = allow;
        self
    }

    pub fn default_mimetype(mut self, mime_type: impl Into<String>) -> Self {
        self.config.default_mimetype = mime_type.into();
        self
    }

    pub fn index_files(mut self, files: Vec<String>) -> Self {
        self.config.index_files = files;
        self
    }

    pub fn tls(mut self, config: Arc<RustlsServerConfig>) -> Self {
        self.tls = Some(config);
        self
    }

    /// Registers a virtual host. The first call becomes the default host served when a request's
    /// `Host` header matches no alias.
    pub fn virtual_host(
        mut self,
        aliases: Vec<String>,
        document_root: PathBuf,
    ) -> Result<Self, ConfigError> {
        self.vhosts.push(VirtualHost::new(aliases, document_root)?);
        Ok(self)
    }

    pub fn mimetype(mut self, extension: impl Into<String>, mime_type: impl Into<String>) -> Self {
        self.mime.add(extension, mime_type);
        self
    }

    pub fn on_ip_check(mut self, hook: Arc<dyn IpCheckHook>) -> Self {
        self.callbacks.ip_check = Some(hook);
        self
    }

    pub fn on_url_check(mut self, hook: Arc<dyn UrlCheckHook>) -> Self {
        self.callbacks.url_check = Some(hook);
        self
    }

    pub fn on_data(mut self, hook: Arc<dyn DataHook>) -> Self {
        self.callbacks.data = Some(hook);
        self
    }

    pub fn on_close(mut self, hook: Arc<dyn CloseHook>) -> Self {
        self.callbacks.close = Some(hook);
        self
    }

    /// Validates the accumulated configuration and produces a not-yet-started [`Server`].
    pub fn build(self) -> Result<Server, ConfigError> {
        if self.vhosts.is_empty() {
            return Err(ConfigError::NoVirtualHosts);
        }
        if self.config.workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }

        Ok(Server {
            bind_addr: self.bind_addr,
            config: Arc::new(self.config),
            vhosts: Arc::new(VirtualHosts::new(self.vhosts)),
            callbacks: self.callbacks,
            mime: self.mime,
            tls: self.tls,
        })
    }
}

/// A validated, not-yet-listening server. Holds everything [`Server::start`] needs to spawn the
/// clock thread, the worker shards, and the acceptor thread.
pub struct Server {
    bind_addr: SocketAddr,
    config: Arc<Config>,
    vhosts: Arc<VirtualHosts>,
    callbacks: Callbacks,
    mime: MimeRegistry,
    tls: Option<Arc<RustlsServerConfig>>,
}

impl Server {
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn vhost_list(&self) -> &[VirtualHost] {
        self.vhosts.list()
    }

    pub fn mimetype_list(&self) -> Vec<(&str, &str)> {
        self.mime.list()
    }

    /// Binds the listening socket, spawns the clock thread, `workers` shard threads, and the
    /// acceptor thread. Worker threads synchronize on a [`Barrier`] before the acceptor starts
    /// accepting, replacing `mklib_start`'s `sched_list[i].initialized` busy-poll with a single
    /// wait that wakes exactly when every shard is ready.
    pub fn start(self) -> Result<RunningServer, ConfigError> {
        let clock_handle = ClockHandle::spawn();
        let clock = clock_handle.clock();
        let running = Arc::new(AtomicBool::new(true));
        let ready = Arc::new(Barrier::new(self.config.workers + 1));

        let netio = match self.tls {
            Some(tls_config) => NetioBuilder::Tls(tls_config),
            None => NetioBuilder::Plaintext,
        };

        let mut worker_senders = Vec::with_capacity(self.config.workers);
        let mut worker_wakers = Vec::with_capacity(self.config.workers);
        let mut worker_threads = Vec::with_capacity(self.config.workers);
        let worker_stats = Arc::new(std::sync::Mutex::new(HashMap::new()));

        for id in 0..self.config.workers {
            let (tx, rx) = unbounded();
            let pipeline = Pipeline::new(self.vhosts.clone(), self.config.clone())
                .with_callbacks(self.callbacks.clone())
                .with_mime_registry(self.mime.clone());

            let (worker, waker) = Worker::new(id, rx, self.config.clone(), pipeline, clock.clone())
                .map_err(ConfigError::Bind)?;

            worker_senders.push(tx);
            worker_wakers.push(waker);

            let running = running.clone();
            let ready = ready.clone();
            let stats = worker_stats.clone();
            let handle = std::thread::Builder::new()
                .name(format!("corehttpd-worker-{id}"))
                .spawn(move || worker.run(running, ready, stats))
                .expect("failed to spawn worker thread");
            worker_threads.push(handle);
        }

        let router = Box::new(RoundRobinRouter::new(self.config.workers));
        let mut acceptor = Acceptor::bind(self.bind_addr, netio, worker_senders, worker_wakers, router)?;
        let local_addr = acceptor.local_addr()?;

        let acceptor_running = running.clone();
        let acceptor_ready = ready.clone();
        let acceptor_thread = std::thread::Builder::new()
            .name("corehttpd-acceptor".into())
            .spawn(move || {
                acceptor_ready.wait();
                acceptor.run(&acceptor_running);
            })
            .expect("failed to spawn acceptor thread");

        info!(%local_addr, workers = self.config.workers, "server started");

        Ok(RunningServer {
            local_addr,
            running,
            acceptor_thread: Some(acceptor_thread),
            worker_threads,
            worker_stats,
            _clock_handle: clock_handle,
        })
    }
}

/// A handle to a running server. Dropping this without calling [`Self::stop`] leaves the server
/// running in the background; [`Self::stop`] is the orderly shutdown path, equivalent to
/// `mklib_stop`'s `pthread_cancel` of every worker, but cooperative rather than forced.
pub struct RunningServer {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    acceptor_thread: Option<JoinHandle<()>>,
    worker_threads: Vec<JoinHandle<()>>,
    worker_stats: Arc<std::sync::Mutex<HashMap<usize, WorkerStats>>>,
    _clock_handle: ClockHandle,
}

impl RunningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Point-in-time stats for every worker shard, equivalent to `mklib_scheduler_worker_info`.
    pub fn scheduler_worker_info(&self) -> Vec<WorkerStats> {
        let stats = self.worker_stats.lock().expect("worker stats mutex poisoned");
        let mut ids: Vec<&usize> = stats.keys().collect();
        ids.sort();
        ids.into_iter().map(|id| stats[id]).collect()
    }

    /// Signals every worker and the acceptor to stop, then joins their threads.
    pub fn stop(mut self) {
        use std::sync::atomic::Ordering;
        self.running.store(false, Ordering::Release);

        if let Some(thread) = self.acceptor_thread.take() {
            let _ = thread.join();
        }
        for thread in self.worker_threads.drain(..) {
            let _ = thread.join();
        }
    }
}
