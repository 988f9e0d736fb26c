//! Closed set of UI step keywords

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Keyword {
    // Browser and page control
    OpenBrowser,
    CloseBrowser,
    NewPage,
    ClosePage,
    SetViewportSize,
    Screenshot,

    // Navigation
    Goto,
    Reload,
    GoBack,
    GoForward,
    #[serde(alias = "waitForURL")]
    WaitForUrl,
    WaitForLoadState,

    // Element actions
    Click,
    DblClick,
    RightClick,
    Fill,
    Type,
    Press,
    Clear,
    Check,
    Uncheck,
    SelectOption,
    Hover,
    Focus,
    Blur,
    ScrollIntoView,
    DragAndDrop,
    UploadFile,
    Tap,

    // Waits
    WaitForElement,
    WaitForElementHidden,
    WaitForTimeout,

    // Extraction
    GetText,
    GetAttribute,
    GetTitle,
    #[serde(alias = "getURL")]
    GetUrl,
    GetValue,
    GetCount,

    // Element and page assertions
    AssertVisible,
    AssertHidden,
    AssertText,
    AssertContainsText,
    AssertValue,
    AssertAttribute,
    AssertCount,
    #[serde(alias = "assertURL")]
    AssertUrl,
    AssertTitle,
    AssertEnabled,
    AssertDisabled,
    AssertChecked,
    AssertNotChecked,
    AssertFocused,

    // Tabs and popups
    SwitchToPopup,
    SwitchToTab,
    SwitchToMainTab,
    CloseTab,
    OpenNewTab,

    // Tables
    TableGetCell,
    TableClickCell,
    TableAssertCell,
    TableGetRowCount,
    TableAssertRowCount,
    TableGetColumn,
    TableFindRow,
    TableSortBy,
    TableFilter,
    TableAssertSorted,

    // Generic value assertions
    AssertEquals,
    AssertNotEquals,
    AssertContains,
    AssertGreaterThan,
    AssertLessThan,

    // Dialogs
    AcceptDialog,
    DismissDialog,
    GetAlertText,
    SwitchToFrame,

    // Extension points
    CustomStep,
    CustomCode,
}

impl Keyword {
    pub fn parse(name: &str) -> EngineResult<Self> {
        serde_json::from_value(Value::String(name.to_string()))
            .map_err(|_| EngineError::UnknownKeyword(name.to_string()))
    }

    pub fn name(&self) -> String {
        serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_default()
    }

    /// Marker a `store`/`localStore` entry uses to capture this keyword's output
    pub fn output_marker(&self) -> Option<&'static str> {
        use Keyword::*;
        match self {
            GetText | TableGetCell => Some("$text"),
            GetAttribute => Some("$attribute"),
            GetTitle => Some("$title"),
            GetUrl => Some("$url"),
            GetValue => Some("$value"),
            GetCount | TableGetRowCount => Some("$count"),
            TableGetColumn => Some("$values"),
            TableFindRow => Some("$row"),
            TableFilter => Some("$rows"),
            CustomStep | CustomCode => Some("$result"),
            _ => None,
        }
    }

    /// Counted as an assertion in the step's report entry
    pub fn is_assertion(&self) -> bool {
        use Keyword::*;
        matches!(
            self,
            AssertVisible
                | AssertHidden
                | AssertText
                | AssertContainsText
                | AssertValue
                | AssertAttribute
                | AssertCount
                | AssertUrl
                | AssertTitle
                | AssertEnabled
                | AssertDisabled
                | AssertChecked
                | AssertNotChecked
                | AssertFocused
                | TableAssertCell
                | TableAssertRowCount
                | TableAssertSorted
                | AssertEquals
                | AssertNotEquals
                | AssertContains
                | AssertGreaterThan
                | AssertLessThan
        )
    }
}

impl std::fmt::Display for Keyword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
