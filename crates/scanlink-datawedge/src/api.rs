//! DataWedge intent API names.

/// Action every API command is broadcast on.
pub const API_ACTION: &str = "com.symbol.datawedge.api.ACTION";
/// Action most command results come back on.
pub const RESULT_ACTION: &str = "com.symbol.datawedge.api.RESULT_ACTION";
/// Action the scanner enumeration result comes back on.
pub const ENUMERATED_SCANNER_ACTION: &str = "com.symbol.datawedge.api.ACTION_ENUMERATEDSCANNERLIST";

/// Command extras.
pub mod extras {
    pub const SET_CONFIG: &str = "com.symbol.datawedge.api.SET_CONFIG";
    pub const GET_DATAWEDGE_STATUS: &str = "com.symbol.datawedge.api.GET_DATAWEDGE_STATUS";
    pub const ENUMERATE_SCANNERS: &str = "com.symbol.datawedge.api.ENUMERATE_SCANNERS";
    pub const GET_SCANNER_STATUS: &str = "com.symbol.datawedge.api.GET_SCANNER_STATUS";
    pub const GET_VERSION_INFO: &str = "com.symbol.datawedge.api.GET_VERSION_INFO";
    pub const ENABLE_DATAWEDGE: &str = "com.symbol.datawedge.api.ENABLE_DATAWEDGE";
    pub const SCANNER_INPUT_PLUGIN: &str = "com.symbol.datawedge.api.SCANNER_INPUT_PLUGIN";
    pub const SOFT_SCAN_TRIGGER: &str = "com.symbol.datawedge.api.SOFT_SCAN_TRIGGER";

    pub const SEND_RESULT: &str = "SEND_RESULT";
    pub const COMMAND_IDENTIFIER: &str = "COMMAND_IDENTIFIER";
}

/// Result extras.
pub mod results {
    /// DataWedge status, usually `"ENABLED"` / `"DISABLED"`.
    pub const GET_DATAWEDGE_STATUS: &str = "com.symbol.datawedge.api.RESULT_GET_DATAWEDGE_STATUS";
    /// List of scanner descriptions.
    pub const ENUMERATE_SCANNERS: &str = "com.symbol.datawedge.api.RESULT_ENUMERATE_SCANNERS";
    /// Scanner state string (`WAITING`, `SCANNING`, `DISABLED`, ...).
    pub const SCANNER_STATUS: &str = "com.symbol.datawedge.api.RESULT_SCANNER_STATUS";
    /// Version bundle.
    pub const GET_VERSION_INFO: &str = "com.symbol.datawedge.api.RESULT_GET_VERSION_INFO";

    /// `SUCCESS` / `FAILURE` for commands sent with `SEND_RESULT`.
    pub const RESULT: &str = "RESULT";
    /// The command a `RESULT` belongs to.
    pub const COMMAND: &str = "COMMAND";
}

/// Keys inside an enumerated scanner entry.
pub mod scanner {
    pub const NAME: &str = "SCANNER_NAME";
    pub const CONNECTION_STATE: &str = "SCANNER_CONNECTION_STATE";
    pub const INDEX: &str = "SCANNER_INDEX";
    pub const IDENTIFIER: &str = "SCANNER_IDENTIFIER";
}

/// Keys of a scan broadcast.
pub mod scan {
    pub const DATA_STRING: &str = "com.symbol.datawedge.data_string";
    pub const LABEL_TYPE: &str = "com.symbol.datawedge.label_type";
    pub const SOURCE: &str = "com.symbol.datawedge.source";
}

/// Defaults applied by `initialize`.
pub mod defaults {
    pub const PROFILE_NAME: &str = "CAP_DW_PROFILE";
    pub const INTENT_CATEGORY: &str = "android.intent.category.DEFAULT";
    /// Suffix appended to the package name to form the scan action.
    pub const SCAN_ACTION_SUFFIX: &str = ".SCAN";
}

/// Scan action for a package: `<package>.SCAN`.
pub fn default_scan_action(package_name: &str) -> String {
    format!("{}{}", package_name, defaults::SCAN_ACTION_SUFFIX)
}
