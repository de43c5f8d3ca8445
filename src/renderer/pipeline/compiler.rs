//! Pipeline State Compiler
//!
//! Turns cache-entry requests into native pipeline objects in three stages:
//!
//! ```text
//!  add_asynchronous_compiler_request
//!        │
//!        ▼
//!  [builder queue] ──► builder thread (1)      generate shader source text
//!        │
//!        ▼
//!  [compiler queue] ─► compiler pool (N)       compile source to native shaders
//!        │
//!        ▼
//!  [dispatch queue] ─► dispatch() on owner     create pipeline, install into entry
//! ```
//!
//! Only the last stage touches pipeline objects, and it runs exclusively on
//! the thread that owns the graphics context (the thread that created the
//! compiler). Queues are FIFO, but a later request may finish compiling before
//! an earlier one; entries are found by signature id so order does not matter.
//!
//! Failures in any stage are logged and the request is dropped. The affected
//! entry keeps whatever it had (null or a fallback) until the cache is cleared.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle, ThreadId};

use parking_lot::{Condvar, Mutex};

use crate::errors::Result;
use crate::renderer::backend::{ShaderBackend, StageShaders};
use crate::renderer::pipeline::cache::{
    ComputePipelineStateCacheManager, GraphicsPipelineStateCacheManager, PipelineStateCacheEntry,
};
use crate::renderer::pipeline::kind::{Compute, Graphics, PipelineKind};
use crate::renderer::pipeline::shader_cache::ShaderCacheManager;
use crate::renderer::pipeline::signature::PipelineSignature;
use crate::renderer::settings::PipelineCompilerSettings;
use crate::resources::blueprint::{MaterialBlueprint, ShaderStage};

// ─── Requests ────────────────────────────────────────────────────────────────

pub(crate) struct CompilerRequest<B: ShaderBackend, K: PipelineKind> {
    material: Arc<dyn MaterialBlueprint<B>>,
    entry: Arc<PipelineStateCacheEntry<B, K>>,
    /// Generated source per stage; `None` when the shader was already cached.
    sources: [Option<String>; ShaderStage::COUNT],
    shaders: StageShaders<B::Shader>,
}

impl<B: ShaderBackend, K: PipelineKind> CompilerRequest<B, K> {
    fn new(
        material: Arc<dyn MaterialBlueprint<B>>,
        entry: Arc<PipelineStateCacheEntry<B, K>>,
    ) -> Self {
        Self {
            material,
            entry,
            sources: Default::default(),
            shaders: StageShaders::new(),
        }
    }
}

enum Job<T> {
    Run(T),
    Stop,
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    Builder,
    Compiler,
}

/// Requests accepted by a stage and not yet handed to the next one.
#[derive(Debug, Default)]
struct PendingCounts {
    builder: usize,
    compiler: usize,
}

impl PendingCounts {
    fn get_mut(&mut self, stage: Stage) -> &mut usize {
        match stage {
            Stage::Builder => &mut self.builder,
            Stage::Compiler => &mut self.compiler,
        }
    }
}

// ─── Shared worker state ─────────────────────────────────────────────────────

struct CompilerShared<B: ShaderBackend, K: PipelineKind> {
    backend: Arc<B>,
    shader_cache: Arc<ShaderCacheManager<B>>,
    compiler_tx: flume::Sender<Job<CompilerRequest<B, K>>>,
    dispatch_tx: flume::Sender<CompilerRequest<B, K>>,
    shutdown: AtomicBool,
    in_flight: AtomicUsize,
    pending: Mutex<PendingCounts>,
    drained: Condvar,
}

impl<B: ShaderBackend, K: PipelineKind> CompilerShared<B, K> {
    /// Fills `request.shaders` from the shader cache, or `request.sources`
    /// with freshly generated source text.
    fn build(&self, request: &mut CompilerRequest<B, K>) -> Result<()> {
        let signature = request.entry.signature();
        for &stage in K::STAGES {
            let Some(blueprint) = request.material.shader_blueprint(stage) else {
                continue;
            };
            let combination_id = signature.combination_id(stage);
            if let Some(shader) = self.shader_cache.get(combination_id) {
                request.shaders.set(stage, shader);
                continue;
            }
            let source =
                blueprint.build_source(self.backend.shader_language(), signature.properties())?;
            request.sources[stage.index()] = Some(source);
        }
        Ok(())
    }

    /// Compiles every generated source into a native shader object.
    fn compile(&self, request: &mut CompilerRequest<B, K>) -> Result<()> {
        let signature = request.entry.signature();
        for &stage in K::STAGES {
            let Some(source) = request.sources[stage.index()].take() else {
                continue;
            };
            let shader = self.shader_cache.get_or_compile_source(
                &self.backend,
                signature.combination_id(stage),
                stage,
                &source,
            )?;
            request.shaders.set(stage, shader);
        }
        Ok(())
    }

    /// Creates the pipeline object and installs it into the originating entry.
    fn finish(&self, request: CompilerRequest<B, K>) -> Option<Arc<K::Pipeline<B>>> {
        match K::create_pipeline(&*self.backend, &*request.material, &request.shaders) {
            Ok(pipeline) => {
                let pipeline = Arc::new(pipeline);
                request.entry.install(Arc::clone(&pipeline));
                log::debug!(
                    "[{}] Installed pipeline state for signature {}",
                    K::NAME,
                    request.entry.signature().id()
                );
                Some(pipeline)
            }
            Err(err) => {
                log::error!(
                    "[{}] Failed to create pipeline state for signature {}: {err}",
                    K::NAME,
                    request.entry.signature().id()
                );
                None
            }
        }
    }

    fn drop_request(
        &self,
        request: &CompilerRequest<B, K>,
        stage: &str,
        err: &dyn std::fmt::Display,
    ) {
        log::error!(
            "[{}] {stage} failed for signature {} (material {:#010x}): {err}",
            K::NAME,
            request.entry.signature().id(),
            request.material.id()
        );
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    fn stage_done(&self, stage: Stage) {
        let mut pending = self.pending.lock();
        let counter = pending.get_mut(stage);
        *counter = counter.saturating_sub(1);
        self.drained.notify_all();
    }

    fn wait_drained(&self, stage: Stage) {
        let mut pending = self.pending.lock();
        while *pending.get_mut(stage) > 0 {
            self.drained.wait(&mut pending);
        }
    }

    fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn discard(&self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

fn run_builder<B: ShaderBackend, K: PipelineKind>(
    shared: &CompilerShared<B, K>,
    rx: &flume::Receiver<Job<CompilerRequest<B, K>>>,
) {
    while let Ok(Job::Run(mut request)) = rx.recv() {
        if shared.is_shutting_down() {
            shared.discard();
        } else {
            match shared.build(&mut request) {
                Ok(()) => {
                    shared.pending.lock().compiler += 1;
                    if let Err(flume::SendError(Job::Run(request))) =
                        shared.compiler_tx.send(Job::Run(request))
                    {
                        shared.drop_request(&request, "Queueing", &"compiler queue closed");
                        shared.stage_done(Stage::Compiler);
                    }
                }
                Err(err) => shared.drop_request(&request, "Shader build", &err),
            }
        }
        shared.stage_done(Stage::Builder);
    }
}

fn run_compiler<B: ShaderBackend, K: PipelineKind>(
    shared: &CompilerShared<B, K>,
    rx: &flume::Receiver<Job<CompilerRequest<B, K>>>,
) {
    while let Ok(Job::Run(mut request)) = rx.recv() {
        if shared.is_shutting_down() {
            shared.discard();
        } else {
            match shared.compile(&mut request) {
                Ok(()) => {
                    if let Err(flume::SendError(request)) = shared.dispatch_tx.send(request) {
                        shared.drop_request(&request, "Queueing", &"dispatch queue closed");
                    }
                }
                Err(err) => shared.drop_request(&request, "Shader compile", &err),
            }
        }
        shared.stage_done(Stage::Compiler);
    }
}

// ─── PipelineCompiler ────────────────────────────────────────────────────────

/// Asynchronous compiler for one pipeline kind.
pub struct PipelineCompiler<B: ShaderBackend, K: PipelineKind> {
    shared: Arc<CompilerShared<B, K>>,
    builder_tx: flume::Sender<Job<CompilerRequest<B, K>>>,
    compiler_rx: flume::Receiver<Job<CompilerRequest<B, K>>>,
    dispatch_rx: flume::Receiver<CompilerRequest<B, K>>,
    asynchronous: AtomicBool,
    owner_thread: ThreadId,
    builder_thread: Mutex<Option<JoinHandle<()>>>,
    compiler_threads: Mutex<Vec<JoinHandle<()>>>,
}

pub type GraphicsPipelineCompiler<B> = PipelineCompiler<B, Graphics>;
pub type ComputePipelineCompiler<B> = PipelineCompiler<B, Compute>;

impl<B: ShaderBackend, K: PipelineKind> PipelineCompiler<B, K> {
    /// Spawns the builder thread and the compiler pool.
    ///
    /// The calling thread becomes the owner thread: [`Self::dispatch`] and
    /// synchronous compilation must be called from it.
    pub fn new(
        backend: Arc<B>,
        shader_cache: Arc<ShaderCacheManager<B>>,
        settings: &PipelineCompilerSettings,
    ) -> Result<Self> {
        let (builder_tx, builder_rx) = flume::unbounded();
        let (compiler_tx, compiler_rx) = flume::unbounded();
        let (dispatch_tx, dispatch_rx) = flume::unbounded();

        let shared = Arc::new(CompilerShared {
            backend,
            shader_cache,
            compiler_tx,
            dispatch_tx,
            shutdown: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            pending: Mutex::new(PendingCounts::default()),
            drained: Condvar::new(),
        });

        let builder_shared = Arc::clone(&shared);
        let builder_thread = thread::Builder::new()
            .name(format!("myth-pso-{}-builder", K::NAME))
            .spawn(move || run_builder(&builder_shared, &builder_rx))?;

        let compiler = Self {
            shared,
            builder_tx,
            compiler_rx,
            dispatch_rx,
            asynchronous: AtomicBool::new(settings.asynchronous_compilation),
            owner_thread: thread::current().id(),
            builder_thread: Mutex::new(Some(builder_thread)),
            compiler_threads: Mutex::new(Vec::new()),
        };
        compiler.set_number_of_compiler_threads(settings.resolved_compiler_threads())?;
        Ok(compiler)
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<B> {
        &self.shared.backend
    }

    #[must_use]
    pub fn shader_cache(&self) -> &Arc<ShaderCacheManager<B>> {
        &self.shared.shader_cache
    }

    pub fn set_asynchronous_compilation_enabled(&self, enabled: bool) {
        self.asynchronous.store(enabled, Ordering::Release);
    }

    #[must_use]
    pub fn is_asynchronous_compilation_enabled(&self) -> bool {
        self.asynchronous.load(Ordering::Acquire)
    }

    /// Restarts the compiler pool with `count` threads (at least one).
    ///
    /// Requests already queued are kept; the old threads drain everything in
    /// front of their stop tokens before exiting.
    pub fn set_number_of_compiler_threads(&self, count: usize) -> Result<()> {
        let count = count.max(1);
        let mut threads = self.compiler_threads.lock();
        if self.shared.is_shutting_down() {
            log::warn!("[{}] Compiler shut down, not restarting the pool", K::NAME);
            return Ok(());
        }

        for _ in 0..threads.len() {
            // The receiver is owned by `self`, so the channel is still open.
            let _ = self.shared.compiler_tx.send(Job::Stop);
        }
        for handle in threads.drain(..) {
            if handle.join().is_err() {
                log::error!("[{}] A compiler thread panicked", K::NAME);
            }
        }

        for index in 0..count {
            let shared = Arc::clone(&self.shared);
            let rx = self.compiler_rx.clone();
            let handle = thread::Builder::new()
                .name(format!("myth-pso-{}-compiler-{index}", K::NAME))
                .spawn(move || run_compiler(&shared, &rx))?;
            threads.push(handle);
        }

        log::info!("[{}] Compiler pool running {count} thread(s)", K::NAME);
        Ok(())
    }

    #[must_use]
    pub fn number_of_compiler_threads(&self) -> usize {
        self.compiler_threads.lock().len()
    }

    #[must_use]
    pub fn number_of_in_flight_compiler_requests(&self) -> usize {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    /// Queues `entry` for asynchronous build + compile.
    pub fn add_asynchronous_compiler_request(
        &self,
        material: Arc<dyn MaterialBlueprint<B>>,
        entry: Arc<PipelineStateCacheEntry<B, K>>,
    ) {
        let signature_id = entry.signature().id();
        if self.shared.is_shutting_down() {
            log::debug!(
                "[{}] Compiler shut down, dropping request for signature {signature_id}",
                K::NAME
            );
            return;
        }
        self.shared.in_flight.fetch_add(1, Ordering::AcqRel);
        self.shared.pending.lock().builder += 1;

        if self
            .builder_tx
            .send(Job::Run(CompilerRequest::new(material, entry)))
            .is_err()
        {
            log::error!(
                "[{}] Builder queue closed, dropping request for signature {signature_id}",
                K::NAME
            );
            self.shared.discard();
            self.shared.stage_done(Stage::Builder);
        } else {
            log::debug!("[{}] Queued compile request for signature {signature_id}", K::NAME);
        }
    }

    /// Builds, compiles and installs `entry`'s pipeline inline, bypassing all
    /// queues. Used for emergency compiles and cache pre-warming.
    pub fn instant_synchronous_compiler_request(
        &self,
        material: &Arc<dyn MaterialBlueprint<B>>,
        entry: &Arc<PipelineStateCacheEntry<B, K>>,
    ) -> Option<Arc<K::Pipeline<B>>> {
        self.debug_assert_owner_thread("instant_synchronous_compiler_request");

        let mut request = CompilerRequest::new(Arc::clone(material), Arc::clone(entry));
        let signature = entry.signature();
        for &stage in K::STAGES {
            let Some(blueprint) = material.shader_blueprint(stage) else {
                continue;
            };
            match self.shared.shader_cache.get_or_create(
                &self.shared.backend,
                signature.combination_id(stage),
                blueprint,
                signature.properties(),
                stage,
            ) {
                Ok(shader) => request.shaders.set(stage, shader),
                Err(err) => {
                    log::error!(
                        "[{}] Synchronous {stage:?} shader failed for signature {}: {err}",
                        K::NAME,
                        signature.id()
                    );
                    return None;
                }
            }
        }
        self.shared.finish(request)
    }

    /// Blocks until the builder queue is empty and the builder thread idle.
    pub fn flush_builder_queue(&self) {
        self.shared.wait_drained(Stage::Builder);
    }

    /// Blocks until the compiler queue is empty and all compiler threads idle.
    pub fn flush_compiler_queue(&self) {
        self.shared.wait_drained(Stage::Compiler);
    }

    /// Flushes the builder queue, then the compiler queue. Afterwards every
    /// surviving request waits in the dispatch queue.
    pub fn flush_all_queues(&self) {
        self.flush_builder_queue();
        self.flush_compiler_queue();
    }

    /// Creates and installs the pipeline of every request waiting in the
    /// dispatch queue. Must run on the owner thread.
    ///
    /// Returns the number of pipelines installed.
    pub fn dispatch(&self) -> usize {
        self.debug_assert_owner_thread("dispatch");

        let mut installed = 0;
        while let Ok(request) = self.dispatch_rx.try_recv() {
            if self.shared.finish(request).is_some() {
                installed += 1;
            }
            self.shared.in_flight.fetch_sub(1, Ordering::AcqRel);
        }
        installed
    }

    /// Stops and joins every worker thread and drops all undispatched
    /// requests. Idempotent.
    ///
    /// Requests added afterwards are discarded; synchronous compiles still
    /// work.
    pub fn shutdown(&self) {
        if self.shared.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }

        let _ = self.builder_tx.send(Job::Stop);
        if let Some(handle) = self.builder_thread.lock().take()
            && handle.join().is_err()
        {
            log::error!("[{}] The builder thread panicked", K::NAME);
        }

        let mut threads = self.compiler_threads.lock();
        for _ in 0..threads.len() {
            let _ = self.shared.compiler_tx.send(Job::Stop);
        }
        for handle in threads.drain(..) {
            if handle.join().is_err() {
                log::error!("[{}] A compiler thread panicked", K::NAME);
            }
        }
        drop(threads);

        let mut discarded = 0;
        for _ in self.dispatch_rx.drain() {
            self.shared.discard();
            discarded += 1;
        }
        if discarded > 0 {
            log::debug!("[{}] Discarded {discarded} undispatched request(s)", K::NAME);
        }
        log::info!("[{}] Pipeline compiler shut down", K::NAME);
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shared.is_shutting_down()
    }

    fn debug_assert_owner_thread(&self, operation: &str) {
        debug_assert_eq!(
            thread::current().id(),
            self.owner_thread,
            "{operation} must run on the thread that owns the graphics context"
        );
    }
}

impl<B: ShaderBackend, K: PipelineKind> Drop for PipelineCompiler<B, K> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ─── PipelineCompilerService ─────────────────────────────────────────────────

/// Process-wide compiler service: one graphics and one compute compiler
/// sharing a backend and a shader cache.
///
/// Construct once on the render thread at startup and hand it to every
/// material's cache manager.
pub struct PipelineCompilerService<B: ShaderBackend> {
    backend: Arc<B>,
    shader_cache: Arc<ShaderCacheManager<B>>,
    graphics: Arc<PipelineCompiler<B, Graphics>>,
    compute: Arc<PipelineCompiler<B, Compute>>,
}

impl<B: ShaderBackend> PipelineCompilerService<B> {
    pub fn new(backend: Arc<B>, settings: &PipelineCompilerSettings) -> Result<Self> {
        let shader_cache = Arc::new(ShaderCacheManager::new());
        let graphics = Arc::new(PipelineCompiler::new(
            Arc::clone(&backend),
            Arc::clone(&shader_cache),
            settings,
        )?);
        let compute = Arc::new(PipelineCompiler::new(
            Arc::clone(&backend),
            Arc::clone(&shader_cache),
            settings,
        )?);

        Ok(Self {
            backend,
            shader_cache,
            graphics,
            compute,
        })
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    #[must_use]
    pub fn shader_cache(&self) -> &Arc<ShaderCacheManager<B>> {
        &self.shader_cache
    }

    #[must_use]
    pub fn graphics(&self) -> &Arc<PipelineCompiler<B, Graphics>> {
        &self.graphics
    }

    #[must_use]
    pub fn compute(&self) -> &Arc<PipelineCompiler<B, Compute>> {
        &self.compute
    }

    /// Creates the graphics pipeline-state cache of a material blueprint.
    #[must_use]
    pub fn create_graphics_cache(
        &self,
        material: Arc<dyn MaterialBlueprint<B>>,
    ) -> GraphicsPipelineStateCacheManager<B> {
        GraphicsPipelineStateCacheManager::new(material, Arc::clone(&self.graphics))
    }

    /// Creates the compute pipeline-state cache of a material blueprint.
    #[must_use]
    pub fn create_compute_cache(
        &self,
        material: Arc<dyn MaterialBlueprint<B>>,
    ) -> ComputePipelineStateCacheManager<B> {
        ComputePipelineStateCacheManager::new(material, Arc::clone(&self.compute))
    }

    pub fn set_asynchronous_compilation_enabled(&self, enabled: bool) {
        self.graphics.set_asynchronous_compilation_enabled(enabled);
        self.compute.set_asynchronous_compilation_enabled(enabled);
    }

    #[must_use]
    pub fn is_asynchronous_compilation_enabled(&self) -> bool {
        self.graphics.is_asynchronous_compilation_enabled()
    }

    pub fn set_number_of_compiler_threads(&self, count: usize) -> Result<()> {
        self.graphics.set_number_of_compiler_threads(count)?;
        self.compute.set_number_of_compiler_threads(count)
    }

    #[must_use]
    pub fn number_of_compiler_threads(&self) -> usize {
        self.graphics.number_of_compiler_threads()
    }

    #[must_use]
    pub fn number_of_in_flight_compiler_requests(&self) -> usize {
        self.graphics.number_of_in_flight_compiler_requests()
            + self.compute.number_of_in_flight_compiler_requests()
    }

    pub fn flush_builder_queue(&self) {
        self.graphics.flush_builder_queue();
        self.compute.flush_builder_queue();
    }

    pub fn flush_compiler_queue(&self) {
        self.graphics.flush_compiler_queue();
        self.compute.flush_compiler_queue();
    }

    pub fn flush_all_queues(&self) {
        self.graphics.flush_all_queues();
        self.compute.flush_all_queues();
    }

    /// Drains both dispatch queues. Call once per frame on the render thread.
    pub fn dispatch(&self) -> usize {
        self.graphics.dispatch() + self.compute.dispatch()
    }

    /// Shuts down both compilers. Cache managers that outlive the service
    /// keep their installed pipelines; new asynchronous requests are dropped.
    pub fn shutdown(&self) {
        self.graphics.shutdown();
        self.compute.shutdown();
    }
}

impl<B: ShaderBackend> Drop for PipelineCompilerService<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
