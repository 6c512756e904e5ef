use std::fmt;
use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::error::Result;
use crate::ui::Overlay;

pub const S_TEST_USE: &str = "s_test_use";

/// Game state a script is allowed to touch
pub struct ScriptContext<'a> {
    pub paused: &'a mut bool,
    pub overlay: &'a mut Overlay,
}

/// Behaviour attached to an entity (or to the game globally)
pub trait Script: fmt::Debug {
    fn type_name(&self) -> &'static str;

    fn call(&mut self, dt: f32, ctx: &mut ScriptContext<'_>);

    /// Readable text carried by the script, if it has any
    fn text(&self) -> Option<&str> {
        None
    }

    fn set_text(&mut self, _text: String) {}

    /// Replace the text with the contents of a file
    fn set_text_from_file(&mut self, path: &Path) -> Result<()> {
        self.set_text(fs::read_to_string(path)?);
        Ok(())
    }
}

/// On-use script that opens a "book" overlay with its text and pauses,
/// or closes it again and unpauses.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TestUseScript {
    pub my_text: String,
}

impl TestUseScript {
    pub fn new(text: impl Into<String>) -> Self {
        Self { my_text: text.into() }
    }
}

impl Script for TestUseScript {
    fn type_name(&self) -> &'static str {
        S_TEST_USE
    }

    fn call(&mut self, _dt: f32, ctx: &mut ScriptContext<'_>) {
        if *ctx.paused {
            *ctx.overlay = Overlay::None;
            *ctx.paused = false;
        } else {
            *ctx.overlay = Overlay::Book(self.my_text.clone());
            *ctx.paused = true;
        }
    }

    fn text(&self) -> Option<&str> {
        Some(&self.my_text)
    }

    fn set_text(&mut self, text: String) {
        self.my_text = text;
    }
}

/// Script factory keyed by type name
pub fn create_script(type_name: &str) -> Option<Box<dyn Script>> {
    match type_name {
        S_TEST_USE => Some(Box::new(TestUseScript::default())),
        "" => None,
        other => {
            warn!("unknown script type {:?}", other);
            None
        }
    }
}

pub fn script_types() -> &'static [&'static str] {
    &[S_TEST_USE]
}

/// Run every script in a list, skipping the one at `skip` (an on-use script)
pub fn run_scripts(
    scripts: &mut [Box<dyn Script>],
    skip: Option<usize>,
    dt: f32,
    ctx: &mut ScriptContext<'_>,
) {
    for (i, script) in scripts.iter_mut().enumerate() {
        if Some(i) == skip {
            continue;
        }
        script.call(dt, ctx);
    }
}

pub(crate) fn log_attached(owner: &str, script: &dyn Script) {
    info!("attached script {} to {}", script.type_name(), owner);
}
