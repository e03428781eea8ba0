use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::apm::event::{CommandResult, CommandStarted};
use crate::error::Result;

pub type StartHook = Arc<dyn Fn(&CommandStarted) + Send + Sync>;
pub type CompletionHook = Arc<dyn for<'a> Fn(&CommandResult<'a>) + Send + Sync>;

pub struct Listener {
    no_start_hooks: AtomicBool,
    no_completion_hooks: AtomicBool,
    start_hooks: RwLock<Vec<StartHook>>,
    completion_hooks: RwLock<Vec<CompletionHook>>,
}

impl Default for Listener {
    fn default() -> Self {
        Listener::new()
    }
}

impl Listener {
    pub fn new() -> Listener {
        Listener {
            no_start_hooks: AtomicBool::new(true),
            no_completion_hooks: AtomicBool::new(true),
            start_hooks: RwLock::new(Vec::new()),
            completion_hooks: RwLock::new(Vec::new()),
        }
    }

    pub fn add_start_hook<F>(&self, hook: F) -> Result<()>
    where
        F: Fn(&CommandStarted) + Send + Sync + 'static,
    {
        let mut guard = self.start_hooks.write()?;
        self.no_start_hooks.store(false, Ordering::SeqCst);
        guard.push(Arc::new(hook));
        Ok(())
    }

    pub fn add_completion_hook<F>(&self, hook: F) -> Result<()>
    where
        F: for<'a> Fn(&CommandResult<'a>) + Send + Sync + 'static,
    {
        let mut guard = self.completion_hooks.write()?;
        self.no_completion_hooks.store(false, Ordering::SeqCst);
        guard.push(Arc::new(hook));
        Ok(())
    }

    pub fn run_start_hooks(&self, started: &CommandStarted) -> Result<()> {
        if self.no_start_hooks.load(Ordering::SeqCst) {
            return Ok(());
        }

        let guard = self.start_hooks.read()?;
        for hook in guard.iter() {
            hook(started);
        }
        Ok(())
    }

    pub fn run_completion_hooks(&self, result: &CommandResult) -> Result<()> {
        if self.no_completion_hooks.load(Ordering::SeqCst) {
            return Ok(());
        }

        let guard = self.completion_hooks.read()?;
        for hook in guard.iter() {
            hook(result);
        }
        Ok(())
    }
}
