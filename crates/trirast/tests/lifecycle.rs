mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::Result;
use trirast::device::RenderingContext;
use trirast::{
    ContextState, Engine, EngineConfig, RasterError, RasterResult, ResizeWorkaround, WorkaroundPolicy,
};

use common::{automatic, engine, instance, manual, RES, TRI, TRI_IDX};

#[test]
fn unknown_device_index_is_unavailable() {
    let result = Engine::create(EngineConfig {
        device_index: 4096,
        ..Default::default()
    });
    assert!(matches!(result, Err(RasterError::DeviceUnavailable { index: 4096, .. })));
}

#[test]
fn automatic_engine_rejects_manual_calls() {
    let Some(engine) = automatic(false) else { return };
    assert!(matches!(engine.set_context(), Err(RasterError::ContextState(_))));
    assert!(matches!(engine.release_context(), Err(RasterError::ContextState(_))));
}

#[test]
fn automatic_engine_releases_after_render() -> Result<()> {
    let Some(engine) = automatic(false) else { return Ok(()) };
    engine.render(&instance(&engine, &TRI, 1, &TRI_IDX, RES))?;
    assert_eq!(engine.context_state(), ContextState::Released);
    Ok(())
}

#[test]
fn manual_render_requires_current_context() -> Result<()> {
    let Some(engine) = manual() else { return Ok(()) };
    let req = instance(&engine, &TRI, 1, &TRI_IDX, RES);

    assert!(matches!(engine.render(&req), Err(RasterError::ContextState(_))));
    assert_eq!(engine.reallocation_count(), 0);

    engine.set_context()?;
    let out = engine.render(&req)?;
    assert_eq!(out.raster.shape(), [1, 64, 64, 4]);
    assert_eq!(engine.context_state(), ContextState::Current(thread::current().id()));

    engine.release_context()?;
    assert!(matches!(engine.render(&req), Err(RasterError::ContextState(_))));
    Ok(())
}

#[test]
fn second_thread_cannot_use_held_context() -> Result<()> {
    let Some(engine) = manual() else { return Ok(()) };
    engine.set_context()?;

    thread::scope(|s| {
        s.spawn(|| {
            let req = instance(&engine, &TRI, 1, &TRI_IDX, RES);
            assert!(matches!(engine.render(&req), Err(RasterError::ContextState(_))));
            assert!(matches!(engine.set_context(), Err(RasterError::ContextState(_))));
            assert!(matches!(engine.release_context(), Err(RasterError::ContextState(_))));
        });
    });

    engine.release_context()?;
    thread::scope(|s| {
        s.spawn(|| -> Result<()> {
            engine.set_context()?;
            engine.render(&instance(&engine, &TRI, 1, &TRI_IDX, RES))?;
            engine.release_context()?;
            Ok(())
        })
        .join()
        .expect("render thread panicked")
    })?;
    Ok(())
}

#[test]
fn reacquire_workaround_keeps_rendering() -> Result<()> {
    let Some(engine) = engine(EngineConfig {
        resize_workaround: WorkaroundPolicy::Always,
        ..Default::default()
    }) else {
        return Ok(());
    };

    let out = engine.render(&instance(&engine, &TRI, 1, &TRI_IDX, RES))?;
    let data = engine.read_to_host(&out.raster)?;
    assert_eq!(data[out.raster.offset(0, 40, 40, 3)], 1.0);
    assert_eq!(engine.context_state(), ContextState::Released);
    Ok(())
}

/// Counts its calls; a failing one gives the context up before erroring.
struct CountingHook {
    calls: Arc<AtomicUsize>,
    fail: bool,
}

impl ResizeWorkaround for CountingHook {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn after_resize(&self, ctx: &mut RenderingContext) -> RasterResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.fail {
            return Ok(());
        }
        ctx.release()?;
        Err(RasterError::PlatformWorkaround {
            name: self.name(),
            reason: "driver refused".into(),
        })
    }
}

fn hooked(fail: bool) -> Option<(Engine, Arc<AtomicUsize>)> {
    let calls = Arc::new(AtomicUsize::new(0));
    let hook = CountingHook {
        calls: Arc::clone(&calls),
        fail,
    };
    match Engine::with_resize_workaround(EngineConfig::default(), Box::new(hook)) {
        Ok(engine) => Some((engine, calls)),
        Err(e @ (RasterError::DeviceUnavailable { .. } | RasterError::ContextCreation(_))) => {
            println!("skipping: no GPU available ({e})");
            None
        }
        Err(e) => panic!("unexpected engine creation failure: {e}"),
    }
}

#[test]
fn resize_hook_runs_only_when_buffers_grow() -> Result<()> {
    let Some((engine, calls)) = hooked(false) else { return Ok(()) };

    engine.render(&instance(&engine, &TRI, 1, &TRI_IDX, RES))?;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    engine.render(&instance(&engine, &TRI, 1, &TRI_IDX, RES))?;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(engine.reallocation_count(), 1);

    engine.render(&instance(&engine, &TRI, 1, &TRI_IDX, (128, 128)))?;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(engine.reallocation_count(), 2);
    Ok(())
}

#[test]
fn failing_resize_hook_still_renders() -> Result<()> {
    let Some((engine, calls)) = hooked(true) else { return Ok(()) };

    let out = engine.render(&instance(&engine, &TRI, 1, &TRI_IDX, RES))?;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let data = engine.read_to_host(&out.raster)?;
    assert_eq!(data[out.raster.offset(0, 40, 40, 3)], 1.0);
    assert_eq!(engine.context_state(), ContextState::Released);
    Ok(())
}

#[test]
fn destroy_is_explicit_and_drop_is_equivalent() -> Result<()> {
    let Some(engine) = automatic(true) else { return Ok(()) };
    let out = engine.render(&instance(&engine, &TRI, 1, &TRI_IDX, RES))?;
    engine.destroy();
    // Outputs are caller-owned and outlive the engine.
    assert_eq!(out.raster.shape(), [1, 64, 64, 4]);

    // A manual engine still holding its context tears down on drop.
    let Some(held) = manual() else { return Ok(()) };
    held.set_context()?;
    drop(held);
    Ok(())
}
