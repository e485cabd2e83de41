#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod frame;
pub use frame::{Frame, LinkType};

mod classify;
pub use classify::{classify, FlowMeta, TransportProtocol};

mod measure;
pub use measure::Measure;

pub mod synth;
