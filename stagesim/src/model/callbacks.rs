use std::any::Any;

use crate::model::ModelView;

/// Returned by an update callback to decide whether it runs again next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackStatus {
    Continue,
    Remove,
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct CallbackId(u64);

pub type UserData = Box<dyn Any + Send>;

pub type CallbackFn = Box<dyn FnMut(ModelView<'_>, &mut (dyn Any + Send)) -> CallbackStatus + Send>;

struct UpdateCallback {
    id: CallbackId,
    func: CallbackFn,
    user_data: UserData,
}

/// Controller logic attached to a model, run after the model's own update in
/// registration order.
#[derive(Default)]
pub struct UpdateCallbacks {
    entries: Vec<UpdateCallback>,
    next_id: u64,
}

impl std::fmt::Debug for UpdateCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateCallbacks")
            .field("ids", &self.entries.iter().map(|e| e.id).collect::<Vec<_>>())
            .finish()
    }
}

impl UpdateCallbacks {
    pub fn add<F>(&mut self, func: F, user_data: impl Any + Send) -> CallbackId
    where
        F: FnMut(ModelView<'_>, &mut (dyn Any + Send)) -> CallbackStatus + Send + 'static,
    {
        let id = CallbackId(self.next_id);
        self.next_id += 1;
        self.entries.push(UpdateCallback {
            id,
            func: Box::new(func),
            user_data: Box::new(user_data),
        });

        id
    }

    pub fn remove(&mut self, id: CallbackId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);

        self.entries.len() != before
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn run(&mut self, model: ModelView<'_>) {
        self.entries.retain_mut(|entry| {
            let status = (entry.func)(model, &mut *entry.user_data);

            if status == CallbackStatus::Remove {
                log::debug!("Removing update callback {:?} from {}", entry.id, model.name());
                false
            } else {
                true
            }
        });
    }
}
