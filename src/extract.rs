//! Typed values pulled out of parsed EDI-Crop responses.
//!
//! Every extractor walks `Envelope -> Body -> <operation response>` and fails
//! with [`Error::MissingRequiredNode`] naming the exact node it could not
//! find. Optional children (messages, fields) come back as empty lists.

use tracing::debug;

use crate::error::{Error, MalformedInput, MissingNode, Result};
use crate::features::{project_features, FeatureCollection};
use crate::model::{
    MutationTicket, ProcessStatus, TanSequence, TransactionResult, ValidationMessage,
    ValidationResult, CROP_FIELD_ID,
};
use crate::tree::XmlNode;

pub fn soap_body(root: &XmlNode) -> Result<&XmlNode> {
    root.get("Envelope")
        .ok_or(Error::missing(MissingNode::Envelope))?
        .get("Body")
        .ok_or(Error::missing(MissingNode::Body))
}

/// SOAP 1.1 (`faultcode`/`faultstring`) or 1.2 (`Code/Value`, `Reason/Text`)
/// fault carried in the body, if any.
pub fn soap_fault(root: &XmlNode) -> Option<(String, String)> {
    let fault = soap_body(root).ok()?.get("Fault")?;
    let code = fault
        .child_text("faultcode")
        .or_else(|| fault.path(&["Code", "Value"]).and_then(XmlNode::text))
        .unwrap_or("unknown");
    let message = fault
        .child_text("faultstring")
        .or_else(|| fault.path(&["Reason", "Text"]).and_then(XmlNode::text))
        .unwrap_or("");
    Some((code.to_string(), message.to_string()))
}

fn response(root: &XmlNode, node: MissingNode) -> Result<&XmlNode> {
    soap_body(root)?
        .get(node.node_name())
        .ok_or(Error::missing(node))
}

/// Text of a child that must be present and non-empty.
fn required_text<'a>(parent: &'a XmlNode, node: MissingNode) -> Result<&'a str> {
    parent
        .child_text(node.node_name())
        .filter(|text| !text.is_empty())
        .ok_or(Error::missing(node))
}

fn optional_text(parent: &XmlNode, key: &str) -> String {
    parent.child_text(key).unwrap_or_default().to_string()
}

pub fn extract_ticket(root: &XmlNode) -> Result<MutationTicket> {
    let response = response(root, MissingNode::SubmitResponse)?;
    let ticket = required_text(response, MissingNode::TicketId)?;
    debug!("Submit accepted with ticket {}", ticket);
    Ok(MutationTicket::new(ticket))
}

pub fn extract_process_status(root: &XmlNode) -> Result<ProcessStatus> {
    let status = response(root, MissingNode::ProgressResponse)?
        .get(MissingNode::ProcessStatus.node_name())
        .ok_or(Error::missing(MissingNode::ProcessStatus))?;

    let code = required_text(status, MissingNode::StatusCode)?;
    let percentage = parse_percentage(required_text(status, MissingNode::Percentage)?)?;

    Ok(ProcessStatus {
        code: code.to_string(),
        message: optional_text(status, "StatusMessage"),
        percentage,
    })
}

/// Accepts integral or decimal text; the value is rounded and clamped to
/// 0..=100.
fn parse_percentage(text: &str) -> Result<u8> {
    let value: f64 = text.parse().map_err(|_| MalformedInput::InvalidNumber {
        node: "Percentage",
        value: text.to_string(),
    })?;
    if !value.is_finite() {
        return Err(MalformedInput::InvalidNumber {
            node: "Percentage",
            value: text.to_string(),
        }
        .into());
    }
    Ok(value.round().clamp(0.0, 100.0) as u8)
}

/// `requested` is used when the response does not echo the ticket id.
pub fn extract_validation_result(
    root: &XmlNode,
    requested: &MutationTicket,
) -> Result<ValidationResult> {
    let response = response(root, MissingNode::ValidationResponse)?;

    let ticket = response
        .child_text(MissingNode::TicketId.node_name())
        .filter(|text| !text.is_empty())
        .map(MutationTicket::new)
        .unwrap_or_else(|| requested.clone());

    let messages = response
        .list("ValidationMessage")
        .into_iter()
        .map(|message| ValidationMessage {
            code: optional_text(message, "Code"),
            message: optional_text(message, "Message"),
            severity: optional_text(message, "Severity"),
            crop_field_id: message
                .child_text(CROP_FIELD_ID)
                .filter(|id| !id.is_empty())
                .map(str::to_string),
        })
        .collect::<Vec<_>>();

    let fields = response
        .list("Farm")
        .into_iter()
        .flat_map(|farm| farm.list("Field"))
        .cloned()
        .collect::<Vec<_>>();

    debug!(
        "Validation result for {}: {} messages over {} fields",
        ticket,
        messages.len(),
        fields.len()
    );
    Ok(ValidationResult {
        ticket,
        messages,
        fields,
    })
}

pub fn extract_tan_sequence(root: &XmlNode) -> Result<TanSequence> {
    let response = response(root, MissingNode::TanSequenceResponse)?;
    let text = required_text(response, MissingNode::SequenceNumber)?;
    let number = text.parse().map_err(|_| MalformedInput::InvalidNumber {
        node: "SequenceNumber",
        value: text.to_string(),
    })?;
    Ok(TanSequence::new(number))
}

pub fn extract_formalize_result(
    root: &XmlNode,
    ticket: &MutationTicket,
) -> Result<TransactionResult> {
    transaction_result(response(root, MissingNode::FormalizeResponse)?, ticket)
}

pub fn extract_cancel_result(root: &XmlNode, ticket: &MutationTicket) -> Result<TransactionResult> {
    transaction_result(response(root, MissingNode::CancelResponse)?, ticket)
}

fn transaction_result(response: &XmlNode, ticket: &MutationTicket) -> Result<TransactionResult> {
    Ok(TransactionResult {
        ticket: ticket.clone(),
        code: required_text(response, MissingNode::ResultCode)?.to_string(),
        message: optional_text(response, "ResultMessage"),
    })
}

/// Crop fields of a farm query, projected to features. A response without
/// farm data is an empty collection.
pub fn extract_crop_fields(root: &XmlNode) -> Result<FeatureCollection> {
    project_features(response(root, MissingNode::CropFieldResponse)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_xml_tree;

    fn envelope(body: &str) -> XmlNode {
        parse_xml_tree(&format!(
            r#"<S:Envelope xmlns:S="http://schemas.xmlsoap.org/soap/envelope/"><S:Body>{body}</S:Body></S:Envelope>"#
        ))
        .unwrap()
    }

    #[test]
    fn test_extract_ticket() {
        let root = envelope("<ns2:CropFieldMutationResponse xmlns:ns2=\"urn:x\"><ns2:TicketId>T-77</ns2:TicketId></ns2:CropFieldMutationResponse>");
        assert_eq!(extract_ticket(&root).unwrap().as_str(), "T-77");
    }

    #[test]
    fn test_missing_ticket_id_vs_missing_status_container() {
        let ticket = envelope("<CropFieldMutationResponse><TicketId/></CropFieldMutationResponse>");
        assert_eq!(
            extract_ticket(&ticket).unwrap_err().missing_node(),
            Some(MissingNode::TicketId)
        );

        let status = envelope("<ProcessProgressResponse><Other>1</Other></ProcessProgressResponse>");
        assert_eq!(
            extract_process_status(&status).unwrap_err().missing_node(),
            Some(MissingNode::ProcessStatus)
        );
    }

    #[test]
    fn test_missing_envelope_and_body() {
        let no_envelope = parse_xml_tree("<Other/>").unwrap();
        assert_eq!(
            extract_ticket(&no_envelope).unwrap_err().missing_node(),
            Some(MissingNode::Envelope)
        );

        let no_body = parse_xml_tree("<Envelope><Header/></Envelope>").unwrap();
        assert_eq!(
            extract_ticket(&no_body).unwrap_err().missing_node(),
            Some(MissingNode::Body)
        );

        let wrong_response = envelope("<CancelResponse/>");
        assert_eq!(
            extract_ticket(&wrong_response).unwrap_err().missing_node(),
            Some(MissingNode::SubmitResponse)
        );
    }

    #[test]
    fn test_extract_process_status() {
        let root = envelope(
            "<ProcessProgressResponse><ProcessStatus><StatusCode>IN_PROGRESS</StatusCode>\
             <StatusMessage>Bezig</StatusMessage><Percentage>42.6</Percentage></ProcessStatus></ProcessProgressResponse>",
        );
        let status = extract_process_status(&root).unwrap();
        assert_eq!(status.code, "IN_PROGRESS");
        assert_eq!(status.message, "Bezig");
        assert_eq!(status.percentage, 43);
    }

    #[test]
    fn test_non_numeric_percentage_is_malformed() {
        let root = envelope(
            "<ProcessProgressResponse><ProcessStatus><StatusCode>X</StatusCode><Percentage>half</Percentage></ProcessStatus></ProcessProgressResponse>",
        );
        assert!(matches!(
            extract_process_status(&root),
            Err(Error::MalformedInput(MalformedInput::InvalidNumber { node: "Percentage", .. }))
        ));
    }

    #[test]
    fn test_validation_messages_single_and_repeated() {
        let ticket = MutationTicket::new("T-1");

        let none = envelope("<ValidationResultResponse/>");
        let result = extract_validation_result(&none, &ticket).unwrap();
        assert!(result.is_clean());
        assert_eq!(result.ticket, ticket);

        let one = envelope(
            "<ValidationResultResponse><TicketId>T-1</TicketId><ValidationMessage><Code>V01</Code>\
             <Message>Overlap</Message><Severity>E</Severity><CropFieldID>cf-1</CropFieldID></ValidationMessage>\
             <Farm><Field><FieldId>1</FieldId></Field><Field><FieldId>2</FieldId></Field></Farm></ValidationResultResponse>",
        );
        let result = extract_validation_result(&one, &ticket).unwrap();
        assert_eq!(result.messages.len(), 1);
        assert_eq!(result.messages[0].crop_field_id.as_deref(), Some("cf-1"));
        assert_eq!(result.fields.len(), 2);

        let two = envelope(
            "<ValidationResultResponse><ValidationMessage><Code>A</Code></ValidationMessage>\
             <ValidationMessage><Code>B</Code></ValidationMessage></ValidationResultResponse>",
        );
        let codes: Vec<String> = extract_validation_result(&two, &ticket)
            .unwrap()
            .messages
            .into_iter()
            .map(|m| m.code)
            .collect();
        assert_eq!(codes, vec!["A", "B"]);
    }

    #[test]
    fn test_extract_tan_sequence() {
        let root = envelope("<TanSequenceResponse><SequenceNumber>17</SequenceNumber></TanSequenceResponse>");
        assert_eq!(extract_tan_sequence(&root).unwrap().number(), 17);

        let missing = envelope("<TanSequenceResponse/>");
        assert_eq!(
            extract_tan_sequence(&missing).unwrap_err().missing_node(),
            Some(MissingNode::SequenceNumber)
        );
    }

    #[test]
    fn test_transaction_results() {
        let ticket = MutationTicket::new("T-5");
        let formalized = envelope(
            "<FormalizeResponse><ResultCode>FORMALIZED</ResultCode><ResultMessage>ok</ResultMessage></FormalizeResponse>",
        );
        let result = extract_formalize_result(&formalized, &ticket).unwrap();
        assert_eq!(result.code, "FORMALIZED");
        assert_eq!(result.ticket, ticket);

        let cancelled = envelope("<CancelResponse><ResultMessage>x</ResultMessage></CancelResponse>");
        assert_eq!(
            extract_cancel_result(&cancelled, &ticket).unwrap_err().missing_node(),
            Some(MissingNode::ResultCode)
        );
    }

    #[test]
    fn test_soap_fault_detection() {
        let v11 = envelope("<S:Fault><faultcode>S:Server</faultcode><faultstring>Niet geautoriseerd</faultstring></S:Fault>");
        assert_eq!(
            soap_fault(&v11),
            Some(("S:Server".to_string(), "Niet geautoriseerd".to_string()))
        );

        let v12 = envelope("<Fault><Code><Value>Receiver</Value></Code><Reason><Text lang=\"nl\">stuk</Text></Reason></Fault>");
        assert_eq!(soap_fault(&v12), Some(("Receiver".to_string(), "stuk".to_string())));

        assert!(soap_fault(&envelope("<CancelResponse/>")).is_none());
    }

    #[test]
    fn test_crop_field_response_without_farm_is_empty() {
        let root = envelope("<CropFieldDetailsResponse/>");
        assert!(extract_crop_fields(&root).unwrap().is_empty());
    }
}
