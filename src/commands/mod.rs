//! From recognized text to an action: phrase table, fuzzy resolver and dispatcher.

pub mod dispatcher;
pub mod phrase_table;
pub mod resolver;
pub mod similarity;

pub use dispatcher::{
    Action, ActionDispatcher, CommandExecutor, DispatchOutcome, SystemCommandExecutor,
    default_actions,
};
pub use phrase_table::PhraseTable;
pub use resolver::{CommandResolver, Resolution};
pub use similarity::Scorer;
