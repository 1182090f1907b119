//! SOAP request bodies for the EDI-Crop operations.
//!
//! Only the envelope and the operation payload are produced here; HTTP
//! headers (SOAPAction, bearer token) are added by the transport.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use super::GmlWriter;
use crate::error::Result;
use crate::model::{BorderInput, FieldMutation, MutationTicket, Period, TanSequence};

pub const SOAP_ENVELOPE_NAMESPACE: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const GML_NAMESPACE: &str = "http://www.opengis.net/gml/3.2";
pub const EDICROP_NAMESPACE: &str = "http://www.rvo.nl/schemas/edicrop";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    SubmitMutations,
    ProcessProgress,
    ValidationResult,
    TanSequence,
    Formalize,
    Cancel,
    CropFieldDetails,
}

impl Operation {
    pub fn request_element(self) -> &'static str {
        match self {
            Self::SubmitMutations => "CropFieldMutationRequest",
            Self::ProcessProgress => "ProcessProgressRequest",
            Self::ValidationResult => "ValidationResultRequest",
            Self::TanSequence => "TanSequenceRequest",
            Self::Formalize => "FormalizeRequest",
            Self::Cancel => "CancelRequest",
            Self::CropFieldDetails => "CropFieldDetailsRequest",
        }
    }

    pub fn soap_action(self) -> &'static str {
        match self {
            Self::SubmitMutations => "urn:edicrop:MutateCropFields",
            Self::ProcessProgress => "urn:edicrop:RequestProcessProgress",
            Self::ValidationResult => "urn:edicrop:RequestValidationResult",
            Self::TanSequence => "urn:edicrop:RequestTanSequence",
            Self::Formalize => "urn:edicrop:Formalize",
            Self::Cancel => "urn:edicrop:Cancel",
            Self::CropFieldDetails => "urn:edicrop:RequestCropFields",
        }
    }
}

/// Streams one SOAP envelope around a single operation element.
struct EnvelopeWriter {
    writer: Writer<Vec<u8>>,
    operation: Operation,
}

impl EnvelopeWriter {
    fn open(operation: Operation, sender_id: Option<&str>) -> Result<Self> {
        let mut writer = Writer::new(Vec::new());
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut envelope = BytesStart::new("soapenv:Envelope");
        envelope.push_attribute(("xmlns:soapenv", SOAP_ENVELOPE_NAMESPACE));
        envelope.push_attribute(("xmlns:gml", GML_NAMESPACE));
        writer.write_event(Event::Start(envelope))?;
        writer.write_event(Event::Empty(BytesStart::new("soapenv:Header")))?;
        writer.write_event(Event::Start(BytesStart::new("soapenv:Body")))?;

        let mut body = BytesStart::new(operation.request_element());
        body.push_attribute(("xmlns", EDICROP_NAMESPACE));
        writer.write_event(Event::Start(body))?;

        let mut envelope = Self { writer, operation };
        if let Some(sender_id) = sender_id {
            envelope.element("SenderId", sender_id)?;
        }
        Ok(envelope)
    }

    fn start(&mut self, name: &str) -> Result<()> {
        self.writer.write_event(Event::Start(BytesStart::new(name)))?;
        Ok(())
    }

    fn end(&mut self, name: &str) -> Result<()> {
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    fn element(&mut self, name: &str, text: &str) -> Result<()> {
        self.start(name)?;
        self.writer.write_event(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    /// Already-serialised XML, written without escaping.
    fn raw(&mut self, xml: &str) -> Result<()> {
        self.writer
            .write_event(Event::Text(BytesText::from_escaped(xml)))?;
        Ok(())
    }

    fn finish(mut self) -> Result<String> {
        self.end(self.operation.request_element())?;
        self.end("soapenv:Body")?;
        self.end("soapenv:Envelope")?;
        let bytes = self.writer.into_inner();
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Mutation batch for one farm. Each mutation becomes its own
/// `Field/CropField` with a `MutationType` code, the caller's properties in
/// order and the border as GML.
pub fn submit_request(
    farm_id: &str,
    mutations: &[FieldMutation],
    sender_id: Option<&str>,
) -> Result<String> {
    let gml = GmlWriter::new();
    let mut envelope = EnvelopeWriter::open(Operation::SubmitMutations, sender_id)?;
    envelope.element("FarmId", farm_id)?;
    envelope.start("Farm")?;

    for mutation in mutations {
        envelope.start("Field")?;
        envelope.start("CropField")?;
        envelope.element("MutationType", mutation.action.code())?;
        for (key, value) in &mutation.properties {
            envelope.element(key, value)?;
        }
        match &mutation.border {
            Some(BorderInput::Geometry(geometry)) => {
                let border = gml.write(geometry)?;
                envelope.start("Border")?;
                envelope.raw(&border)?;
                envelope.end("Border")?;
            }
            Some(BorderInput::Gml(border)) => {
                envelope.start("Border")?;
                envelope.raw(border)?;
                envelope.end("Border")?;
            }
            None => {}
        }
        envelope.end("CropField")?;
        envelope.end("Field")?;
    }

    envelope.end("Farm")?;
    envelope.finish()
}

pub fn progress_request(ticket: &MutationTicket, sender_id: Option<&str>) -> Result<String> {
    ticket_request(Operation::ProcessProgress, ticket, sender_id)
}

pub fn validation_request(ticket: &MutationTicket, sender_id: Option<&str>) -> Result<String> {
    ticket_request(Operation::ValidationResult, ticket, sender_id)
}

pub fn cancel_request(ticket: &MutationTicket, sender_id: Option<&str>) -> Result<String> {
    ticket_request(Operation::Cancel, ticket, sender_id)
}

fn ticket_request(
    operation: Operation,
    ticket: &MutationTicket,
    sender_id: Option<&str>,
) -> Result<String> {
    let mut envelope = EnvelopeWriter::open(operation, sender_id)?;
    envelope.element("TicketId", ticket.as_str())?;
    envelope.finish()
}

pub fn tan_sequence_request(farm_id: &str, sender_id: Option<&str>) -> Result<String> {
    let mut envelope = EnvelopeWriter::open(Operation::TanSequence, sender_id)?;
    envelope.element("FarmId", farm_id)?;
    envelope.finish()
}

pub fn formalize_request(
    ticket: &MutationTicket,
    sequence: TanSequence,
    tan: &str,
    sender_id: Option<&str>,
) -> Result<String> {
    let mut envelope = EnvelopeWriter::open(Operation::Formalize, sender_id)?;
    envelope.element("TicketId", ticket.as_str())?;
    envelope.element("SequenceNumber", &sequence.number().to_string())?;
    envelope.element("Tan", tan)?;
    envelope.finish()
}

pub fn crop_field_request(farm_id: &str, period: &Period, sender_id: Option<&str>) -> Result<String> {
    let mut envelope = EnvelopeWriter::open(Operation::CropFieldDetails, sender_id)?;
    envelope.element("FarmId", farm_id)?;
    envelope.start("Period")?;
    envelope.element("BeginDate", &period.begin)?;
    envelope.element("EndDate", &period.end)?;
    envelope.end("Period")?;
    envelope.finish()
}
