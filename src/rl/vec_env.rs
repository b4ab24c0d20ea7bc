use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::data::{Dataset, SolutionHandle};
use crate::error::{AttrError, TransportError};
use crate::rl::{ActionSpace, EnvCtor, Obs, Step};

/// A vectorized environment handle over one or more workers.
///
/// `step` auto-resets any worker whose episode finished: the returned
/// [`Step`] carries `done = true` together with the fresh post-reset
/// observation, so driver loops can run back-to-back episodes without
/// explicit resets.
///
/// `next_target` and `prev_solution` address worker 0; the test handle the
/// factory builds for evaluation always has exactly one worker.
pub trait VecEnv: Send {
    fn n_workers(&self) -> usize;
    fn action_space(&self) -> ActionSpace;
    fn reset(&mut self) -> Result<Vec<Obs>, TransportError>;
    fn step(&mut self, actions: &[Vec<f32>]) -> Result<Vec<Step>, TransportError>;

    fn set_dataset(&mut self, dataset: Arc<Dataset>) -> Result<(), AttrError>;
    fn set_meta_learning(&mut self, on: bool) -> Result<(), AttrError>;
    fn set_randomize(&mut self, on: bool) -> Result<(), AttrError>;
    fn next_target(&mut self) -> Result<(), AttrError>;
    fn prev_solution(&mut self) -> Result<SolutionHandle, AttrError>;
    /// One log per worker.
    fn fill_log(&mut self) -> Result<Vec<Vec<f64>>, AttrError>;
}

/// Single-process vectorization: all workers stepped in a loop on the
/// calling thread. Used whenever exactly one worker is requested.
pub struct DummyVecEnv {
    envs: Vec<Box<dyn super::Environment>>,
    space: ActionSpace,
}

impl DummyVecEnv {
    pub fn new(ctors: Vec<EnvCtor>) -> Self {
        assert!(!ctors.is_empty(), "at least one worker required");
        let envs: Vec<_> = ctors.into_iter().map(|c| c()).collect();
        let space = envs[0].action_space();
        DummyVecEnv { envs, space }
    }
}

impl VecEnv for DummyVecEnv {
    fn n_workers(&self) -> usize {
        self.envs.len()
    }

    fn action_space(&self) -> ActionSpace {
        self.space.clone()
    }

    fn reset(&mut self) -> Result<Vec<Obs>, TransportError> {
        Ok(self.envs.iter_mut().map(|e| e.reset()).collect())
    }

    fn step(&mut self, actions: &[Vec<f32>]) -> Result<Vec<Step>, TransportError> {
        assert_eq!(actions.len(), self.envs.len(), "one action per worker");
        let steps = self
            .envs
            .iter_mut()
            .zip(actions)
            .map(|(env, action)| {
                let mut step = env.step(action);
                if step.done {
                    step.obs = env.reset();
                }
                step
            })
            .collect();
        Ok(steps)
    }

    fn set_dataset(&mut self, dataset: Arc<Dataset>) -> Result<(), AttrError> {
        for env in &mut self.envs {
            env.set_dataset(dataset.clone())?;
        }
        Ok(())
    }

    fn set_meta_learning(&mut self, on: bool) -> Result<(), AttrError> {
        for env in &mut self.envs {
            env.set_meta_learning(on)?;
        }
        Ok(())
    }

    fn set_randomize(&mut self, on: bool) -> Result<(), AttrError> {
        for env in &mut self.envs {
            env.set_randomize(on)?;
        }
        Ok(())
    }

    fn next_target(&mut self) -> Result<(), AttrError> {
        self.envs[0].next_target()
    }

    fn prev_solution(&mut self) -> Result<SolutionHandle, AttrError> {
        self.envs[0].prev_solution()
    }

    fn fill_log(&mut self) -> Result<Vec<Vec<f64>>, AttrError> {
        self.envs.iter().map(|e| e.fill_log()).collect()
    }
}

#[derive(Clone)]
enum Request {
    Reset,
    Step(Vec<f32>),
    SetDataset(Arc<Dataset>),
    SetMetaLearning(bool),
    SetRandomize(bool),
    NextTarget,
    PrevSolution,
    FillLog,
    Close,
}

enum Response {
    Space(ActionSpace),
    Obs(Obs),
    Step(Step),
    Attr(Result<(), &'static str>),
    Solution(Result<SolutionHandle, &'static str>),
    FillLog(Result<Vec<f64>, &'static str>),
}

fn attr_name(err: AttrError) -> &'static str {
    match err {
        AttrError::Unsupported(name) => name,
        AttrError::Transport(_) => "transport",
    }
}

fn worker_loop(ctor: EnvCtor, rx: Receiver<Request>, tx: Sender<Response>) {
    // The environment is constructed here, on the worker itself.
    let mut env = ctor();
    if tx.send(Response::Space(env.action_space())).is_err() {
        return;
    }
    while let Ok(request) = rx.recv() {
        let response = match request {
            Request::Reset => Response::Obs(env.reset()),
            Request::Step(action) => {
                let mut step = env.step(&action);
                if step.done {
                    step.obs = env.reset();
                }
                Response::Step(step)
            }
            Request::SetDataset(d) => Response::Attr(env.set_dataset(d).map_err(attr_name)),
            Request::SetMetaLearning(on) => {
                Response::Attr(env.set_meta_learning(on).map_err(attr_name))
            }
            Request::SetRandomize(on) => Response::Attr(env.set_randomize(on).map_err(attr_name)),
            Request::NextTarget => Response::Attr(env.next_target().map_err(attr_name)),
            Request::PrevSolution => Response::Solution(env.prev_solution().map_err(attr_name)),
            Request::FillLog => Response::FillLog(env.fill_log().map_err(attr_name)),
            Request::Close => break,
        };
        if tx.send(response).is_err() {
            break;
        }
    }
}

struct Worker {
    req_tx: Sender<Request>,
    resp_rx: Receiver<Response>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    fn send(&self, request: Request) -> Result<(), TransportError> {
        self.req_tx
            .send(request)
            .map_err(|_| TransportError::ChannelClosed)
    }

    fn recv(&self) -> Result<Response, TransportError> {
        self.resp_rx.recv().map_err(|_| TransportError::UnexpectedEof)
    }
}

/// Parallel vectorization: one worker per OS thread, driven over a
/// request/response channel pair. The per-worker constructor runs inside its
/// worker, never on the coordinating thread.
pub struct WorkerVecEnv {
    workers: Vec<Worker>,
    space: ActionSpace,
}

impl WorkerVecEnv {
    pub fn new(ctors: Vec<EnvCtor>) -> Result<Self, TransportError> {
        assert!(!ctors.is_empty(), "at least one worker required");
        let mut workers = Vec::with_capacity(ctors.len());
        for ctor in ctors {
            let (req_tx, req_rx) = mpsc::channel();
            let (resp_tx, resp_rx) = mpsc::channel();
            let handle = std::thread::spawn(move || worker_loop(ctor, req_rx, resp_tx));
            workers.push(Worker {
                req_tx,
                resp_rx,
                handle: Some(handle),
            });
        }
        // Startup handshake doubles as the action-space query.
        let mut space = None;
        for worker in &workers {
            match worker.recv()? {
                Response::Space(s) => space = Some(s),
                _ => return Err(TransportError::UnexpectedEof),
            }
        }
        let space = space.ok_or(TransportError::UnexpectedEof)?;
        Ok(WorkerVecEnv { workers, space })
    }

    /// Every queued response is consumed even when a worker reports an
    /// unsupported attribute; a partial drain would leave the channels out of
    /// step with later requests.
    fn broadcast_attr(&mut self, request: Request) -> Result<(), AttrError> {
        for worker in &self.workers {
            worker.send(request.clone())?;
        }
        let mut unsupported = None;
        for worker in &self.workers {
            match worker.recv()? {
                Response::Attr(Ok(())) => {}
                Response::Attr(Err(name)) => unsupported = Some(name),
                _ => return Err(AttrError::Transport(TransportError::UnexpectedEof)),
            }
        }
        match unsupported {
            Some(name) => Err(AttrError::Unsupported(name)),
            None => Ok(()),
        }
    }
}

impl VecEnv for WorkerVecEnv {
    fn n_workers(&self) -> usize {
        self.workers.len()
    }

    fn action_space(&self) -> ActionSpace {
        self.space.clone()
    }

    fn reset(&mut self) -> Result<Vec<Obs>, TransportError> {
        for worker in &self.workers {
            worker.send(Request::Reset)?;
        }
        self.workers
            .iter()
            .map(|w| match w.recv()? {
                Response::Obs(obs) => Ok(obs),
                _ => Err(TransportError::UnexpectedEof),
            })
            .collect()
    }

    fn step(&mut self, actions: &[Vec<f32>]) -> Result<Vec<Step>, TransportError> {
        assert_eq!(actions.len(), self.workers.len(), "one action per worker");
        for (worker, action) in self.workers.iter().zip(actions) {
            worker.send(Request::Step(action.clone()))?;
        }
        self.workers
            .iter()
            .map(|w| match w.recv()? {
                Response::Step(step) => Ok(step),
                _ => Err(TransportError::UnexpectedEof),
            })
            .collect()
    }

    fn set_dataset(&mut self, dataset: Arc<Dataset>) -> Result<(), AttrError> {
        self.broadcast_attr(Request::SetDataset(dataset))
    }

    fn set_meta_learning(&mut self, on: bool) -> Result<(), AttrError> {
        self.broadcast_attr(Request::SetMetaLearning(on))
    }

    fn set_randomize(&mut self, on: bool) -> Result<(), AttrError> {
        self.broadcast_attr(Request::SetRandomize(on))
    }

    fn next_target(&mut self) -> Result<(), AttrError> {
        let worker = &self.workers[0];
        worker.send(Request::NextTarget)?;
        match worker.recv()? {
            Response::Attr(result) => result.map_err(AttrError::Unsupported),
            _ => Err(AttrError::Transport(TransportError::UnexpectedEof)),
        }
    }

    fn prev_solution(&mut self) -> Result<SolutionHandle, AttrError> {
        let worker = &self.workers[0];
        worker.send(Request::PrevSolution)?;
        match worker.recv()? {
            Response::Solution(result) => result.map_err(AttrError::Unsupported),
            _ => Err(AttrError::Transport(TransportError::UnexpectedEof)),
        }
    }

    fn fill_log(&mut self) -> Result<Vec<Vec<f64>>, AttrError> {
        for worker in &self.workers {
            worker.send(Request::FillLog)?;
        }
        // Drain every response before reporting an unsupported attribute
        let mut logs = Vec::with_capacity(self.workers.len());
        let mut unsupported = None;
        for worker in &self.workers {
            match worker.recv()? {
                Response::FillLog(Ok(log)) => logs.push(log),
                Response::FillLog(Err(name)) => unsupported = Some(name),
                _ => return Err(AttrError::Transport(TransportError::UnexpectedEof)),
            }
        }
        match unsupported {
            Some(name) => Err(AttrError::Unsupported(name)),
            None => Ok(logs),
        }
    }
}

impl Drop for WorkerVecEnv {
    fn drop(&mut self) {
        for worker in &self.workers {
            let _ = worker.req_tx.send(Request::Close);
        }
        for worker in &mut self.workers {
            if let Some(handle) = worker.handle.take() {
                let _ = handle.join();
            }
        }
    }
}

/// Wraps a vectorized environment to present the last `n_stack` observation
/// frames, concatenated oldest-first and zero-padded after resets.
pub struct FrameStack {
    inner: Box<dyn VecEnv>,
    n_stack: usize,
    frames: Vec<VecDeque<Obs>>,
    obs_len: usize,
}

impl FrameStack {
    pub fn new(inner: Box<dyn VecEnv>, n_stack: usize) -> Self {
        assert!(n_stack > 0, "frame stack depth must be positive");
        let frames = (0..inner.n_workers()).map(|_| VecDeque::new()).collect();
        FrameStack {
            inner,
            n_stack,
            frames,
            obs_len: 0,
        }
    }

    fn push_frame(&mut self, worker: usize, obs: Obs) {
        let deque = &mut self.frames[worker];
        if deque.len() == self.n_stack {
            deque.pop_front();
        }
        deque.push_back(obs);
    }

    fn stacked(&self, worker: usize) -> Obs {
        let deque = &self.frames[worker];
        let mut out = vec![0.0; (self.n_stack - deque.len()) * self.obs_len];
        for frame in deque {
            out.extend_from_slice(frame);
        }
        out
    }
}

impl VecEnv for FrameStack {
    fn n_workers(&self) -> usize {
        self.inner.n_workers()
    }

    fn action_space(&self) -> ActionSpace {
        self.inner.action_space()
    }

    fn reset(&mut self) -> Result<Vec<Obs>, TransportError> {
        let obs = self.inner.reset()?;
        self.obs_len = obs.first().map_or(0, Vec::len);
        for (worker, o) in obs.into_iter().enumerate() {
            self.frames[worker].clear();
            self.push_frame(worker, o);
        }
        Ok((0..self.n_workers()).map(|w| self.stacked(w)).collect())
    }

    fn step(&mut self, actions: &[Vec<f32>]) -> Result<Vec<Step>, TransportError> {
        let steps = self.inner.step(actions)?;
        let out = steps
            .into_iter()
            .enumerate()
            .map(|(worker, step)| {
                if step.done {
                    // The inner env auto-reset; stale frames belong to the
                    // finished episode.
                    self.frames[worker].clear();
                }
                self.push_frame(worker, step.obs);
                Step {
                    obs: self.stacked(worker),
                    reward: step.reward,
                    done: step.done,
                }
            })
            .collect();
        Ok(out)
    }

    fn set_dataset(&mut self, dataset: Arc<Dataset>) -> Result<(), AttrError> {
        self.inner.set_dataset(dataset)
    }

    fn set_meta_learning(&mut self, on: bool) -> Result<(), AttrError> {
        self.inner.set_meta_learning(on)
    }

    fn set_randomize(&mut self, on: bool) -> Result<(), AttrError> {
        self.inner.set_randomize(on)
    }

    fn next_target(&mut self) -> Result<(), AttrError> {
        self.inner.next_target()
    }

    fn prev_solution(&mut self) -> Result<SolutionHandle, AttrError> {
        self.inner.prev_solution()
    }

    fn fill_log(&mut self) -> Result<Vec<Vec<f64>>, AttrError> {
        self.inner.fill_log()
    }
}
