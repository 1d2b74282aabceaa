//! Dependency-aware task scheduler for one phase of a turn. Tasks start
//! as soon as their dependencies reach a terminal state, run concurrently
//! on the runtime, and have their effects applied on the scheduler's
//! thread in passes; a `Notify` wakes the loop when an operation lands.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{oneshot, Notify};
use tracing::{debug, warn};

use crate::backend::{ClassifyBackend, ClassifyRequest, ClassifyResponse, GenerateBackend};
use crate::config::types::{ClassifierDef, GeneratorDef, Phase};
use crate::context::TurnContext;
use crate::error::OrchestratorError;
use crate::task::{ApplyOutcome, ClassifierTask, GenRequest, GeneratorTask};

pub struct Orchestrator {
    classifiers: Vec<ClassifierTask>,
    generators: Vec<GeneratorTask>,
    classify_backend: Arc<dyn ClassifyBackend>,
    generate_backend: Arc<dyn GenerateBackend>,

    /// Generator names some other task depends on. Lazy generators with
    /// no entry here never start.
    depended_on: HashSet<String>,

    notify: Arc<Notify>,
}

impl Orchestrator {
    pub fn new(
        classifiers: Vec<ClassifierDef>,
        generators: Vec<GeneratorDef>,
        classify_backend: Arc<dyn ClassifyBackend>,
        generate_backend: Arc<dyn GenerateBackend>,
    ) -> Self {
        let mut depended_on = HashSet::new();
        for c in &classifiers {
            depended_on.extend(c.dependencies.iter().cloned());
        }
        for g in &generators {
            depended_on.extend(g.dependencies.iter().cloned());
        }

        Self {
            classifiers: classifiers.into_iter().map(ClassifierTask::new).collect(),
            generators: generators.into_iter().map(GeneratorTask::new).collect(),
            classify_backend,
            generate_backend,
            depended_on,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Run every task eligible in `phase` to a terminal state. Returns
    /// `Stalled` if a pass makes no progress with nothing in flight while
    /// tasks remain; a valid task set never hits that.
    pub async fn run_phase(
        &mut self,
        phase: Phase,
        ctx: &mut TurnContext,
    ) -> Result<(), OrchestratorError> {
        self.reset(phase);

        loop {
            let progress = self.pass(phase, ctx);

            let pending = self.pending_count();
            if pending == 0 {
                return Ok(());
            }
            if progress {
                continue;
            }
            if self.inflight_count() > 0 {
                // notify_one buffers a permit, so a completion landing
                // between the pass and this await still wakes us.
                self.notify.notified().await;
            } else {
                return Err(OrchestratorError::Stalled { pending });
            }
        }
    }

    fn reset(&mut self, phase: Phase) {
        for task in &mut self.classifiers {
            task.reset();
        }
        for task in &mut self.generators {
            task.reset();
            if task.def.phase == phase && task.def.lazy && !self.depended_on.contains(&task.def.name)
            {
                debug!(generator = %task.def.name, "lazy generator has no dependents; skipping");
                task.state.skipped = true;
            }
        }
    }

    fn pending_count(&self) -> usize {
        self.classifiers.iter().filter(|t| !t.state.is_done()).count()
            + self.generators.iter().filter(|t| !t.state.is_done()).count()
    }

    fn inflight_count(&self) -> usize {
        self.classifiers
            .iter()
            .filter(|t| t.state.inflight.is_some())
            .count()
            + self
                .generators
                .iter()
                .filter(|t| t.state.inflight.is_some())
                .count()
    }

    /// One scheduler pass: collect landed results, apply ready tasks,
    /// start newly unblocked ones. Returns whether anything moved.
    fn pass(&mut self, phase: Phase, ctx: &mut TurnContext) -> bool {
        let mut progress = false;

        for task in &mut self.classifiers {
            let before = task.state.inflight.is_some();
            task.state.poll();
            progress |= before && task.state.inflight.is_none();
        }
        for task in &mut self.generators {
            let before = task.state.inflight.is_some();
            task.state.poll();
            progress |= before && task.state.inflight.is_none();
        }

        for i in 0..self.classifiers.len() {
            if self.classifiers[i].state.is_ready() {
                self.classifiers[i].apply(ctx);
                progress = true;
            }
        }
        for i in 0..self.generators.len() {
            if self.generators[i].state.is_ready() {
                match self.generators[i].apply(ctx) {
                    ApplyOutcome::NotReady => {}
                    // Retrying returns the task to not-started; the start
                    // sweep below re-issues it in this same pass.
                    _ => progress = true,
                }
            }
        }

        let done = self.done_map();
        for i in 0..self.classifiers.len() {
            if self.classifiers[i].state.is_started() {
                continue;
            }
            if !deps_satisfied(&self.classifiers[i].def.dependencies, &done) {
                continue;
            }
            progress = true;
            if let Some(request) = self.classifiers[i].build_request(phase, ctx) {
                let (tx, rx) = oneshot::channel();
                self.classifiers[i].state.inflight = Some(rx);
                spawn_classify(self.classify_backend.clone(), request, tx, self.notify.clone());
            }
        }
        for i in 0..self.generators.len() {
            if self.generators[i].state.is_started() {
                continue;
            }
            if !deps_satisfied(&self.generators[i].def.dependencies, &done) {
                continue;
            }
            progress = true;
            if let Some(request) = self.generators[i].build_request(phase, ctx) {
                let (tx, rx) = oneshot::channel();
                self.generators[i].state.inflight = Some(rx);
                spawn_generate(self.generate_backend.clone(), request, tx, self.notify.clone());
            }
        }

        progress
    }

    fn done_map(&self) -> HashMap<String, bool> {
        let mut done = HashMap::new();
        for task in &self.generators {
            done.insert(task.def.name.clone(), task.state.is_done());
        }
        for task in &self.classifiers {
            // The loader rejects name collisions across task kinds, so
            // generators winning this entry is unobservable.
            done.entry(task.def.name.clone())
                .or_insert(task.state.is_done());
        }
        done
    }
}

/// Dependencies naming no declared task are satisfied trivially.
fn deps_satisfied(deps: &[String], done: &HashMap<String, bool>) -> bool {
    deps.iter()
        .all(|dep| done.get(dep).copied().unwrap_or(true))
}

fn spawn_classify(
    backend: Arc<dyn ClassifyBackend>,
    request: ClassifyRequest,
    tx: oneshot::Sender<ClassifyResponse>,
    notify: Arc<Notify>,
) {
    tokio::spawn(async move {
        let response = match backend.classify(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "classification request failed");
                ClassifyResponse::default()
            }
        };
        let _ = tx.send(response);
        notify.notify_one();
    });
}

fn spawn_generate(
    backend: Arc<dyn GenerateBackend>,
    request: GenRequest,
    tx: oneshot::Sender<String>,
    notify: Arc<Notify>,
) {
    tokio::spawn(async move {
        let output = match request {
            GenRequest::Text(req) => match backend.text(req).await {
                Ok(response) => response.result,
                Err(e) => {
                    warn!(error = %e, "text generation request failed");
                    String::new()
                }
            },
            GenRequest::Image(req) => match backend.image(req).await {
                Ok(response) => response.url,
                Err(e) => {
                    warn!(error = %e, "image generation request failed");
                    String::new()
                }
            },
        };
        let _ = tx.send(output);
        notify.notify_one();
    });
}
