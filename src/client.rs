//! Mutation lifecycle client.
//!
//! A ticket moves through
//!
//! ```text
//! SUBMITTED --poll--> IN_PROGRESS --poll--> VALIDATED --formalize--> FORMALIZED
//!                                  |                  \--cancel----> CANCELLED
//!                                  +--> VALIDATION_ERROR
//!                                  +--> TECHNICAL_ERROR
//! ```
//!
//! Each method is one request/response exchange. The client remembers no
//! tickets; callers pass the ticket back in and decide when to poll again
//! (see [`crate::poll::Poller`]).

use tracing::info;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::extract::{
    extract_cancel_result, extract_crop_fields, extract_formalize_result,
    extract_process_status, extract_tan_sequence, extract_ticket, extract_validation_result,
    soap_fault,
};
use crate::features::FeatureCollection;
use crate::model::{
    FieldMutation, MutationAction, MutationTicket, Period, ProcessStatus, TanSequence,
    TransactionResult, ValidationResult, CROP_FIELD_ID, END_DATE,
};
use crate::parser::parse_xml_tree;
use crate::transport::{CredentialProvider, SoapRequest, Transport};
use crate::tree::XmlNode;
use crate::writer::request::{self, Operation};

pub struct EdiCropClient<T, C> {
    config: ClientConfig,
    transport: T,
    credentials: C,
}

impl<T: Transport, C: CredentialProvider> EdiCropClient<T, C> {
    pub fn new(config: ClientConfig, transport: T, credentials: C) -> Self {
        Self {
            config,
            transport,
            credentials,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Submits a batch of crop-field changes for one farm.
    ///
    /// The batch is checked before anything is sent: a delete without
    /// `EndDate` (or without `CropFieldID`) fails with
    /// [`Error::ValidationFailed`] and no request is made.
    pub fn submit_mutations(
        &self,
        farm_id: &str,
        mutations: &[FieldMutation],
    ) -> Result<MutationTicket> {
        validate_mutations(mutations)?;
        let body = request::submit_request(farm_id, mutations, self.sender())?;
        let root = self.call(Operation::SubmitMutations, body)?;
        let ticket = extract_ticket(&root)?;
        info!(
            "Submitted {} mutations for farm {} as ticket {}",
            mutations.len(),
            farm_id,
            ticket
        );
        Ok(ticket)
    }

    pub fn poll_status(&self, ticket: &MutationTicket) -> Result<ProcessStatus> {
        let body = request::progress_request(ticket, self.sender())?;
        let root = self.call(Operation::ProcessProgress, body)?;
        let status = extract_process_status(&root)?;
        info!(
            "Ticket {}: {} ({}%)",
            ticket, status.code, status.percentage
        );
        Ok(status)
    }

    pub fn fetch_validation(&self, ticket: &MutationTicket) -> Result<ValidationResult> {
        let body = request::validation_request(ticket, self.sender())?;
        let root = self.call(Operation::ValidationResult, body)?;
        extract_validation_result(&root, ticket)
    }

    /// Fresh TAN sequence number; request one right before every formalize.
    pub fn fetch_tan_sequence(&self, farm_id: &str) -> Result<TanSequence> {
        let body = request::tan_sequence_request(farm_id, self.sender())?;
        let root = self.call(Operation::TanSequence, body)?;
        extract_tan_sequence(&root)
    }

    pub fn formalize(
        &self,
        ticket: &MutationTicket,
        sequence: TanSequence,
        tan: &str,
    ) -> Result<TransactionResult> {
        let body = request::formalize_request(ticket, sequence, tan, self.sender())?;
        let root = self.call(Operation::Formalize, body)?;
        let result = extract_formalize_result(&root, ticket)?;
        info!("Ticket {} formalized: {}", ticket, result.code);
        Ok(result)
    }

    pub fn cancel(&self, ticket: &MutationTicket) -> Result<TransactionResult> {
        let body = request::cancel_request(ticket, self.sender())?;
        let root = self.call(Operation::Cancel, body)?;
        let result = extract_cancel_result(&root, ticket)?;
        info!("Ticket {} cancelled: {}", ticket, result.code);
        Ok(result)
    }

    /// Registered crop fields of a farm for `period`, as GeoJSON features.
    pub fn fetch_crop_fields(&self, farm_id: &str, period: &Period) -> Result<FeatureCollection> {
        let body = request::crop_field_request(farm_id, period, self.sender())?;
        let root = self.call(Operation::CropFieldDetails, body)?;
        extract_crop_fields(&root)
    }

    fn sender(&self) -> Option<&str> {
        self.config.sender_id.as_deref()
    }

    fn call(&self, operation: Operation, body: String) -> Result<XmlNode> {
        let request = SoapRequest {
            endpoint: self.config.endpoint.clone(),
            action: operation.soap_action(),
            body,
            bearer_token: self.credentials.bearer_token()?,
            timeout: self.config.timeout,
        };
        let response = self.transport.send(&request)?;
        let root = parse_xml_tree(&response)?;
        if let Some((code, message)) = soap_fault(&root) {
            return Err(Error::SoapFault { code, message });
        }
        Ok(root)
    }
}

/// Pre-flight checks run before any network call.
pub fn validate_mutations(mutations: &[FieldMutation]) -> Result<()> {
    if mutations.is_empty() {
        return Err(Error::validation(0, "batch contains no mutations"));
    }

    for (index, mutation) in mutations.iter().enumerate() {
        if let Some((key, _)) = mutation
            .properties
            .iter()
            .find(|(key, _)| !is_xml_name(key))
        {
            return Err(Error::validation(
                index,
                format!("property name `{key}` is not a valid element name"),
            ));
        }

        if mutation.action == MutationAction::Delete {
            if !has_value(mutation, END_DATE) {
                return Err(Error::validation(
                    index,
                    format!("delete requires an `{END_DATE}` property"),
                ));
            }
            if !has_value(mutation, CROP_FIELD_ID) {
                return Err(Error::validation(
                    index,
                    format!("delete requires a `{CROP_FIELD_ID}` property"),
                ));
            }
        }
    }
    Ok(())
}

fn has_value(mutation: &FieldMutation, key: &str) -> bool {
    mutation
        .property(key)
        .is_some_and(|value| !value.trim().is_empty())
}

fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}
