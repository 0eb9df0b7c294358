use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// One call on the service socket. Variant names are the RPC method names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum TimekeepRequest {
    Ping,
    Subscribe,
    Introspect,

    AddFact {
        fact: String,
        #[serde(default)]
        start_time: i64,
        #[serde(default)]
        end_time: i64,
        #[serde(default)]
        temporary: bool,
    },
    GetFact {
        fact_id: i64,
    },
    UpdateFact {
        fact_id: i64,
        fact: String,
        #[serde(default)]
        start_time: i64,
        #[serde(default)]
        end_time: i64,
        #[serde(default)]
        temporary: bool,
    },
    StopTracking {
        #[serde(default)]
        end_time: i64,
    },
    RemoveFact {
        fact_id: i64,
    },
    GetFacts {
        #[serde(default)]
        start_date: u32,
        #[serde(default)]
        end_date: u32,
        #[serde(default)]
        search_terms: String,
        #[serde(default)]
        reverse_search_terms: bool,
    },
    GetTodaysFacts,

    AddCategory {
        name: String,
    },
    GetCategoryId {
        category: String,
    },
    UpdateCategory {
        id: i64,
        name: String,
    },
    RemoveCategory {
        id: i64,
    },
    GetCategories,

    AddActivity {
        name: String,
        #[serde(default = "uncategorized")]
        category_id: i64,
    },
    UpdateActivity {
        id: i64,
        name: String,
        #[serde(default = "uncategorized")]
        category_id: i64,
    },
    RemoveActivity {
        id: i64,
    },
    GetCategoryActivities {
        #[serde(default = "uncategorized")]
        category_id: i64,
    },
    GetActivities {
        #[serde(default)]
        search: String,
    },
    ChangeCategory {
        id: i64,
        category_id: i64,
    },
    GetActivityByName {
        activity: String,
        #[serde(default = "uncategorized")]
        category_id: i64,
        #[serde(default)]
        resurrect: bool,
    },

    GetTags {
        #[serde(default)]
        only_autocomplete: bool,
    },
    GetTagIds {
        tags: Vec<String>,
    },
    SetTagsAutocomplete {
        tags: String,
    },

    Quit,
    Toggle,
}

fn uncategorized() -> i64 {
    -1
}

impl TimekeepRequest {
    pub fn method(&self) -> &'static str {
        match self {
            Self::Ping => "Ping",
            Self::Subscribe => "Subscribe",
            Self::Introspect => "Introspect",
            Self::AddFact { .. } => "AddFact",
            Self::GetFact { .. } => "GetFact",
            Self::UpdateFact { .. } => "UpdateFact",
            Self::StopTracking { .. } => "StopTracking",
            Self::RemoveFact { .. } => "RemoveFact",
            Self::GetFacts { .. } => "GetFacts",
            Self::GetTodaysFacts => "GetTodaysFacts",
            Self::AddCategory { .. } => "AddCategory",
            Self::GetCategoryId { .. } => "GetCategoryId",
            Self::UpdateCategory { .. } => "UpdateCategory",
            Self::RemoveCategory { .. } => "RemoveCategory",
            Self::GetCategories => "GetCategories",
            Self::AddActivity { .. } => "AddActivity",
            Self::UpdateActivity { .. } => "UpdateActivity",
            Self::RemoveActivity { .. } => "RemoveActivity",
            Self::GetCategoryActivities { .. } => "GetCategoryActivities",
            Self::GetActivities { .. } => "GetActivities",
            Self::ChangeCategory { .. } => "ChangeCategory",
            Self::GetActivityByName { .. } => "GetActivityByName",
            Self::GetTags { .. } => "GetTags",
            Self::GetTagIds { .. } => "GetTagIds",
            Self::SetTagsAutocomplete { .. } => "SetTagsAutocomplete",
            Self::Quit => "Quit",
            Self::Toggle => "Toggle",
        }
    }
}

/// Name plus input and output signature of one RPC method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MethodSignature {
    pub name: &'static str,
    pub input: &'static str,
    pub output: &'static str,
}

const fn method(name: &'static str, input: &'static str, output: &'static str) -> MethodSignature {
    MethodSignature { name, input, output }
}

/// The published RPC surface.
pub const METHODS: &[MethodSignature] = &[
    method("AddFact", "siib", "i"),
    method("GetFact", "i", "(iiissisasii)"),
    method("UpdateFact", "isiib", "i"),
    method("StopTracking", "i", "i"),
    method("RemoveFact", "i", "i"),
    method("GetFacts", "uusb", "a(iiissisasii)"),
    method("GetTodaysFacts", "", "a(iiissisasii)"),
    method("AddCategory", "s", "i"),
    method("GetCategoryId", "s", "i"),
    method("UpdateCategory", "is", ""),
    method("RemoveCategory", "i", ""),
    method("GetCategories", "", "a(is)"),
    method("AddActivity", "si", "i"),
    method("UpdateActivity", "isi", ""),
    method("RemoveActivity", "i", "i"),
    method("GetCategoryActivities", "i", "a(isis)"),
    method("GetActivities", "s", "a(ss)"),
    method("ChangeCategory", "ii", "b"),
    method("GetActivityByName", "sib", "a{sv}"),
    method("GetTags", "b", "a(isb)"),
    method("GetTagIds", "as", "a(isb)"),
    method("SetTagsAutocomplete", "s", ""),
    method("Quit", "", ""),
    method("Toggle", "", ""),
];

pub fn find_method(name: &str) -> Option<&'static MethodSignature> {
    METHODS.iter().find(|m| m.name == name)
}

/// Broadcast signals. None carries a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    TagsChanged,
    FactsChanged,
    ActivitiesChanged,
    ToggleCalled,
}

impl Signal {
    pub const ALL: [Signal; 4] = [
        Signal::TagsChanged,
        Signal::FactsChanged,
        Signal::ActivitiesChanged,
        Signal::ToggleCalled,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Signal::TagsChanged => "TagsChanged",
            Signal::FactsChanged => "FactsChanged",
            Signal::ActivitiesChanged => "ActivitiesChanged",
            Signal::ToggleCalled => "ToggleCalled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TimekeepResponse {
    pub status: String,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub version: String,
}

impl TimekeepResponse {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            status: "ok".to_string(),
            data: Some(data),
            error: None,
            version: PROTOCOL_VERSION.to_string(),
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            data: None,
            error: Some(msg.into()),
            version: PROTOCOL_VERSION.to_string(),
        }
    }

    pub fn signal(signal: Signal) -> Self {
        Self {
            status: "signal".to_string(),
            data: Some(serde_json::json!({"signal": signal})),
            error: None,
            version: PROTOCOL_VERSION.to_string(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }

    /// The signal carried by a `signal` frame.
    pub fn as_signal(&self) -> Option<Signal> {
        if self.status != "signal" {
            return None;
        }
        let value = self.data.as_ref()?.get("signal")?.clone();
        serde_json::from_value(value).ok()
    }
}
