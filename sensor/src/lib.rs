#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub use sensor_capture::*;
pub use sensor_core::*;
pub use sensor_store::*;
pub use sensor_wire::{classify, synth, FlowMeta, Frame, LinkType, Measure, TransportProtocol};
