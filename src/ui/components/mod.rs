mod command_input;
mod input;
mod picker;
mod search_input;

pub use command_input::{CommandEvent, CommandInput};
pub use input::{InputResult, TextInput};
pub use picker::{Picker, PickerEvent, PickerItem};
pub use search_input::{SearchEvent, SearchInput};

/// How a component answered a key press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyResult<T> {
  /// Consumed, nothing for the parent to do
  Handled,
  /// Consumed, with an event for the parent
  Event(T),
  /// Not consumed; the parent should try its own bindings
  NotHandled,
}
