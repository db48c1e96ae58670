//! Storage protocol client
//!
//! Conjoined session lifecycle, object data calls, and the requester capability
//! they run on.

pub mod conjoined;
pub mod data;
pub mod http;
pub(crate) mod protocol;
pub mod requester;

pub use conjoined::{
    abort_conjoined, finish_conjoined, start_conjoined, ConjoinedParams, ConjoinedSession,
};
pub use data::{archive, delete_key, read_to_end, retrieve, RetrieveParams};
pub use http::HttpRequester;
pub use requester::{ByteStream, Request, RequestBody, Requester, Response};
