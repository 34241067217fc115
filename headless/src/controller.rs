use std::any::Any;

use stagesim::{BumperArray, Model, ModelView, model::CallbackStatus};

/// Per-model state kept between ticks.
#[derive(Debug, Default)]
struct BumpReport {
    interval: u64,
    last_hits: Vec<bool>,
}

/// Log whenever a transducer starts or stops touching something, plus a
/// summary every `interval` ticks.
pub fn attach(model: &mut Model, interval: u64) {
    model.add_update_callback(
        report,
        BumpReport {
            interval: interval.max(1),
            last_hits: Vec::new(),
        },
    );
}

fn report(view: ModelView<'_>, data: &mut (dyn Any + Send)) -> CallbackStatus {
    let Some(state) = data.downcast_mut::<BumpReport>() else {
        log::error!("{}: bump report lost its state", view.name());
        return CallbackStatus::Remove;
    };

    let Some(samples) = view.sensor::<BumperArray>().and_then(BumperArray::samples) else {
        return CallbackStatus::Continue;
    };

    let hits: Vec<bool> = samples.iter().map(|s| s.hit).collect();

    for (i, sample) in samples.iter().enumerate() {
        let was_hit = state.last_hits.get(i).copied().unwrap_or(false);

        if sample.hit && !was_hit {
            log::info!(
                "{} [tick {}]: transducer {i} touched at {}",
                view.name(),
                view.update_count(),
                sample.hit_point
            );
        } else if !sample.hit && was_hit {
            log::info!(
                "{} [tick {}]: transducer {i} released",
                view.name(),
                view.update_count()
            );
        }
    }

    if view.update_count() % state.interval == 0 {
        log::debug!(
            "{} [tick {}]: {}/{} transducers in contact",
            view.name(),
            view.update_count(),
            hits.iter().filter(|&&h| h).count(),
            hits.len()
        );
    }

    state.last_hits = hits;

    CallbackStatus::Continue
}
