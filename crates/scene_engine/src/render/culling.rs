//! # Frustum culling
//!
//! Turns a prepared instance snapshot into a dense run of draw commands for
//! the instances that survive the precondition and the sphere/frustum test.
//!
//! The parallel path splits the snapshot into a fixed number of batches and
//! runs them on the worker pool. Each surviving instance claims a base
//! instance from the builder's atomic counter, so slot order follows arrival
//! order and is not deterministic; the selected *set* matches the
//! single-threaded path. Waiting for batches is bounded: on timeout the run
//! keeps what arrived and unfilled slots stay as empty commands.

use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{unbounded, RecvTimeoutError};

use super::frustum::Frustum;
use super::gpu_data::{DrawCommand, InstanceData};
use super::indirect::IndirectCommandBuilder;
use super::worker_pool::WorkerPool;
use crate::config::CullingConfig;
use crate::ecs::components::ShadingModel;
use crate::ecs::{ComponentId, EntityId};
use crate::foundation::math::{transform_point, Mat4, Vec3};

/// Outcome of a precondition for one instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullDecision {
    /// Run the sphere/frustum test
    Continue,
    /// Visible without testing
    Pass,
    /// Never visible
    Discard,
}

/// Custom precondition callback
pub type PreconditionFn = dyn Fn(&CullInstance, &CullView) -> CullDecision + Send + Sync;

/// Per-instance short-circuit evaluated before the frustum test
#[derive(Clone, Default)]
pub enum Precondition {
    /// Always run the frustum test
    #[default]
    None,
    /// Every instance is visible
    AlwaysPass,
    /// No instance is visible
    NeverPass,
    /// Decide per instance and view
    Custom(Arc<PreconditionFn>),
}

impl Precondition {
    /// Wrap a closure
    pub fn custom<F>(decide: F) -> Self
    where
        F: Fn(&CullInstance, &CullView) -> CullDecision + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(decide))
    }

    /// Discard instances that do not cast shadows, test the rest
    pub fn shadow_casters() -> Self {
        Self::custom(|instance, _| {
            if instance.cast_shadows {
                CullDecision::Continue
            } else {
                CullDecision::Discard
            }
        })
    }

    /// Decision for one instance
    pub fn decide(&self, instance: &CullInstance, view: &CullView) -> CullDecision {
        match self {
            Precondition::None => CullDecision::Continue,
            Precondition::AlwaysPass => CullDecision::Pass,
            Precondition::NeverPass => CullDecision::Discard,
            Precondition::Custom(decide) => decide(instance, view),
        }
    }
}

impl fmt::Debug for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precondition::None => f.write_str("None"),
            Precondition::AlwaysPass => f.write_str("AlwaysPass"),
            Precondition::NeverPass => f.write_str("NeverPass"),
            Precondition::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// What a culling run looks through
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CullView {
    /// Volume instances are tested against
    pub frustum: Frustum,
    /// World-space eye position, for distance-based preconditions
    pub eye: Vec3,
}

impl CullView {
    /// View from a frustum and eye position
    pub fn new(frustum: Frustum, eye: Vec3) -> Self {
        Self { frustum, eye }
    }
}

/// Everything culling and command building need about one mesh instance,
/// captured during prepare.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CullInstance {
    /// Mesh instance component
    pub component: ComponentId,
    /// Owning entity
    pub entity: EntityId,
    /// Stable per-frame slot in the transform buffer
    pub transform_index: u32,
    /// Model matrix
    pub model: Mat4,
    /// Largest axis of the world scale
    pub max_scale: f32,
    /// Object-space bounding sphere center
    pub sphere_center: Vec3,
    /// Object-space bounding sphere radius
    pub sphere_radius: f32,
    /// Index count of the mesh
    pub index_count: u32,
    /// First index of the mesh
    pub first_index: u32,
    /// Base vertex of the mesh
    pub base_vertex: i32,
    /// Material storage index
    pub material_index: u32,
    /// Opaque shading tag, only read by preconditions
    pub shading_model: ShadingModel,
    /// Whether the instance casts shadows
    pub cast_shadows: bool,
}

impl CullInstance {
    /// World-space bounding sphere
    pub fn world_sphere(&self) -> (Vec3, f32) {
        (
            transform_point(&self.model, &self.sphere_center),
            self.sphere_radius * self.max_scale,
        )
    }

    /// Draw command for this instance at `base_instance`
    pub fn draw_command(&self, base_instance: u32) -> DrawCommand {
        DrawCommand {
            count: self.index_count,
            instance_count: 1,
            first_index: self.first_index,
            base_vertex: self.base_vertex,
            base_instance,
        }
    }

    /// Instance buffer entry for this instance
    pub fn instance_data(&self) -> InstanceData {
        InstanceData {
            material_index: self.material_index,
            transform_index: self.transform_index,
        }
    }
}

/// Whether `instance` should be drawn for `view`
pub fn is_visible(instance: &CullInstance, view: &CullView, precondition: &Precondition) -> bool {
    match precondition.decide(instance, view) {
        CullDecision::Pass => true,
        CullDecision::Discard => false,
        CullDecision::Continue => {
            let (center, radius) = instance.world_sphere();
            view.frustum.intersects_sphere(&center, radius)
        }
    }
}

/// Statistics of the most recent run
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CullStats {
    /// Instances examined
    pub tested: usize,
    /// Base instances claimed
    pub visible: u32,
    /// Batches dispatched (1 on the single-threaded path)
    pub batches: usize,
    /// Batches whose results arrived
    pub completed_batches: usize,
    /// Whether the bounded wait expired
    pub timed_out: bool,
    /// Wall time of the run
    pub elapsed: Duration,
}

struct BatchResult {
    visible: Vec<(u32, u32)>,
}

/// Batched frustum culler
#[derive(Debug)]
pub struct FrustumCuller {
    batch_count: usize,
    timeout: Duration,
    pool: Option<WorkerPool>,
    last_stats: CullStats,
}

impl FrustumCuller {
    /// Culler configured from `config`; spawns a pool when multithreaded
    pub fn new(config: &CullingConfig) -> Self {
        let pool = config
            .multithreaded
            .then(|| WorkerPool::new(config.resolved_worker_threads()));
        Self {
            batch_count: config.batch_count.max(1),
            timeout: config.batch_timeout(),
            pool,
            last_stats: CullStats::default(),
        }
    }

    /// Whether runs use the worker pool
    pub fn is_multithreaded(&self) -> bool {
        self.pool.is_some()
    }

    /// Statistics of the last run
    pub fn last_stats(&self) -> CullStats {
        self.last_stats
    }

    /// Cull `instances` into `builder` and return the visible count.
    ///
    /// Calls [`IndirectCommandBuilder::count`], so the builder's counter is
    /// zero again when this returns.
    pub fn cull(
        &mut self,
        instances: &Arc<[CullInstance]>,
        view: &CullView,
        precondition: &Precondition,
        builder: &mut IndirectCommandBuilder,
    ) -> u32 {
        let started = Instant::now();
        builder.begin(instances.len());

        let mut stats = match &self.pool {
            Some(pool) if !instances.is_empty() => {
                Self::cull_parallel(pool, self.batch_count, self.timeout, instances, view, precondition, builder)
            }
            _ => Self::cull_sequential(instances, view, precondition, builder),
        };

        let visible = builder.count();
        if stats.timed_out {
            builder.abandon_counter();
        }

        stats.tested = instances.len();
        stats.visible = visible;
        stats.elapsed = started.elapsed();
        log::debug!(
            "Culled {} instances in {} batches: {} visible ({:?})",
            stats.tested,
            stats.batches,
            stats.visible,
            stats.elapsed
        );
        self.last_stats = stats;
        visible
    }

    fn cull_sequential(
        instances: &[CullInstance],
        view: &CullView,
        precondition: &Precondition,
        builder: &mut IndirectCommandBuilder,
    ) -> CullStats {
        for instance in instances {
            if is_visible(instance, view, precondition) {
                let slot = builder.claim();
                builder.write(slot, instance.draw_command(slot), instance.instance_data());
            }
        }
        CullStats {
            batches: 1,
            completed_batches: 1,
            ..CullStats::default()
        }
    }

    fn cull_parallel(
        pool: &WorkerPool,
        batch_count: usize,
        timeout: Duration,
        instances: &Arc<[CullInstance]>,
        view: &CullView,
        precondition: &Precondition,
        builder: &mut IndirectCommandBuilder,
    ) -> CullStats {
        let len = instances.len();
        let batch_size = len.div_ceil(batch_count.min(len));
        let counter = builder.counter();
        let (sender, receiver) = unbounded::<BatchResult>();
        let mut stats = CullStats::default();

        for start in (0..len).step_by(batch_size) {
            let end = (start + batch_size).min(len);
            let batch = Arc::clone(instances);
            let batch_view = *view;
            let batch_precondition = precondition.clone();
            let batch_counter = Arc::clone(&counter);
            let sender = sender.clone();

            let dispatched = pool.execute(move || {
                let mut visible = Vec::new();
                for index in start..end {
                    if is_visible(&batch[index], &batch_view, &batch_precondition) {
                        let slot = batch_counter.fetch_add(1, Ordering::AcqRel);
                        visible.push((slot, index as u32));
                    }
                }
                let _ = sender.send(BatchResult { visible });
            });

            if dispatched.is_err() {
                log::error!("Worker pool rejected batch {}..{}, culling it inline", start, end);
                for index in start..end {
                    if is_visible(&instances[index], view, precondition) {
                        let slot = builder.claim();
                        let instance = &instances[index];
                        builder.write(slot, instance.draw_command(slot), instance.instance_data());
                    }
                }
                continue;
            }
            stats.batches += 1;
        }
        drop(sender);

        let deadline = Instant::now() + timeout;
        while stats.completed_batches < stats.batches {
            match receiver.recv_deadline(deadline) {
                Ok(batch) => {
                    for (slot, index) in batch.visible {
                        let instance = &instances[index as usize];
                        builder.write(slot, instance.draw_command(slot), instance.instance_data());
                    }
                    stats.completed_batches += 1;
                }
                Err(RecvTimeoutError::Timeout) => {
                    log::error!(
                        "Culling timed out after {:?}: {} of {} batches complete, rendering partial set",
                        timeout,
                        stats.completed_batches,
                        stats.batches
                    );
                    stats.timed_out = true;
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    log::error!(
                        "Culling batches lost: {} of {} reported before workers hung up",
                        stats.completed_batches,
                        stats.batches
                    );
                    break;
                }
            }
        }
        stats
    }
}
