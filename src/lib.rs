pub mod client;
pub mod config;
pub mod error;
pub mod extract;
pub mod features;
pub mod geometry;
pub mod model;
pub mod parser;
pub mod poll;
pub mod transport;
pub mod tree;
pub mod writer;

pub use client::{validate_mutations, EdiCropClient};
pub use config::ClientConfig;
pub use error::{Error, MalformedInput, MissingNode, Result};
pub use features::{Feature, FeatureCollection};
pub use geometry::{Coord, Geometry, LineString, MultiPolygon, Polygon};
pub use model::{
    FieldMutation, MutationAction, MutationTicket, Period, ProcessState, ProcessStatus,
    TanSequence, TransactionResult, ValidationMessage, ValidationResult,
};
pub use parser::parse_xml_tree;
pub use poll::{CancellationToken, Poller};
pub use transport::{CredentialProvider, SharedCredential, SoapRequest, StaticCredential, Transport};
pub use tree::XmlNode;
pub use writer::{encode_geojson_to_gml, encode_gml, write_feature_collection, GmlWriter};

#[cfg(feature = "http")]
pub use transport::HttpTransport;
