//! Community features built on the same store: user profiles, the activity
//! board and the question board. Joins and answers feed the notification
//! emitter.

pub mod activities;
pub mod model;
pub mod questions;
pub mod users;

pub use activities::ActivityBoard;
pub use model::{Activity, Location, NewActivity, Participant, Question, Response, UserProfile};
pub use questions::QuestionBoard;
pub use users::UserDirectory;
