pub mod finalize;
pub mod input;
pub mod navigation;

pub use finalize::FinalizeHandler;
pub use input::{
    CheckHandler, FillDateHandler, FillHandler, GroupCheckboxHandler, MatchSelectHandler,
    QuestionAnswerHandler, SelectHandler, UploadHandler,
};
pub use navigation::{
    BatchClickHandler, ClickHandler, GotoHandler, KeyboardHandler, PauseHandler, ReadHandler,
    WaitHandler,
};

use serde_json::Value;

use crate::action::value_text;

/// Booleans become `Yes`/`No`; everything else is its plain text.
pub(crate) fn yes_no_text(value: &Value) -> String {
    match value {
        Value::Bool(true) => "Yes".into(),
        Value::Bool(false) => "No".into(),
        other => value_text(other),
    }
}
