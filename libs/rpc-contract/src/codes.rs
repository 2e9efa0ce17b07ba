//! JSON-RPC error codes

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

// Application range
pub const UNAUTHORIZED: i64 = -32001;
pub const PATH_TRAVERSAL: i64 = -32002;
pub const NOT_FOUND: i64 = -32004;
pub const INVALID_STATE: i64 = -32009;
pub const VERIFICATION_FAILED: i64 = -32010;
pub const VALIDATION: i64 = -32022;
pub const SECURITY: i64 = -32023;
