// Resume scoring: document extraction, normalization and the end-to-end pipeline.
// `bulk` fans an uploaded zip archive out over the same pipeline.

pub mod bulk;
pub mod extract;
pub mod handlers;
pub mod normalize;
pub mod pipeline;
