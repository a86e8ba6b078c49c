//! NetFlow v9 body decoding: header, flowset dispatch, template learning,
//! data-record enrichment, and (when enabled) forwarding re-emission
//! (spec §4.3.1, §4.3.3).

use std::net::{IpAddr, Ipv4Addr};

use log::debug;
use nom::number::complete::{be_u16, be_u32};
use nom::IResult;

use super::fields::{self, IPV4_DST_ADDR, IPV4_SRC_ADDR};
use super::template::{TemplateDef, TemplateKey, TemplateTable};
use super::{DecodeError, DecodeOutcome, FlowSummary};
use crate::cache::Asn;
use crate::resolver::AsnResolver;
use crate::time::build_unix_time;

const TEMPLATE_FLOWSET_ID: u16 = 0;
const OPTIONS_TEMPLATE_FLOWSET_ID: u16 = 1;
/// Per the REDESIGN FLAG fix: any flowset id of 256 or above carries flow
/// data keyed by that id as a template id, not only exactly 256.
const DATA_FLOWSET_MIN_ID: u16 = 256;

struct Header {
    count: u16,
    sys_uptime: u32,
    unix_secs: u32,
    sequence_number: u32,
    source_id: u32,
}

fn parse_header(input: &[u8]) -> IResult<&[u8], Header> {
    let (input, count) = be_u16(input)?;
    let (input, sys_uptime) = be_u32(input)?;
    let (input, unix_secs) = be_u32(input)?;
    let (input, sequence_number) = be_u32(input)?;
    let (input, source_id) = be_u32(input)?;
    Ok((
        input,
        Header {
            count,
            sys_uptime,
            unix_secs,
            sequence_number,
            source_id,
        },
    ))
}

fn write_header(out: &mut Vec<u8>, header: &Header) {
    out.extend_from_slice(&9u16.to_be_bytes());
    out.extend_from_slice(&header.count.to_be_bytes());
    out.extend_from_slice(&header.sys_uptime.to_be_bytes());
    out.extend_from_slice(&header.unix_secs.to_be_bytes());
    out.extend_from_slice(&header.sequence_number.to_be_bytes());
    out.extend_from_slice(&header.source_id.to_be_bytes());
}

pub fn decode(
    input: &[u8],
    exporter: IpAddr,
    templates: &TemplateTable,
    resolver: Option<&AsnResolver>,
    forward: bool,
) -> Result<DecodeOutcome, DecodeError> {
    let (mut cursor, header) = parse_header(input).map_err(|_| DecodeError::Truncated)?;

    debug!(
        "v9: datagram from {exporter} exported at {:?}, sequence {}",
        build_unix_time(header.unix_secs, 0),
        header.sequence_number
    );

    let mut outcome = DecodeOutcome::default();
    let mut forward_body: Option<Vec<u8>> = forward.then(Vec::new);

    while cursor.len() >= 4 {
        let (rest, flow_set_id) = be_u16::<_, nom::error::Error<&[u8]>>(cursor).unwrap();
        let (rest, length) = be_u16::<_, nom::error::Error<&[u8]>>(rest).unwrap();
        let length = length as usize;
        if length < 4 || length - 4 > rest.len() {
            break;
        }
        let body = &rest[..length - 4];
        let next_cursor = &rest[length - 4..];

        match flow_set_id {
            TEMPLATE_FLOWSET_ID => {
                let records = parse_template_records(body);
                for (template_id, def) in &records {
                    templates.insert(
                        TemplateKey {
                            exporter,
                            source_id: header.source_id,
                            template_id: *template_id,
                        },
                        def.clone(),
                    );
                }
                if let Some(buf) = forward_body.as_mut() {
                    emit_template_flowset(buf, flow_set_id, &records);
                }
            }
            OPTIONS_TEMPLATE_FLOWSET_ID => {
                let records = parse_options_template_records(body);
                for (template_id, def) in &records {
                    templates.insert(
                        TemplateKey {
                            exporter,
                            source_id: header.source_id,
                            template_id: *template_id,
                        },
                        def.clone(),
                    );
                }
                if let Some(buf) = forward_body.as_mut() {
                    // Options records are passed through byte-for-byte.
                    buf.extend_from_slice(&flow_set_id.to_be_bytes());
                    buf.extend_from_slice(&(length as u16).to_be_bytes());
                    buf.extend_from_slice(body);
                }
            }
            id if id >= DATA_FLOWSET_MIN_ID => {
                let key = TemplateKey {
                    exporter,
                    source_id: header.source_id,
                    template_id: id,
                };
                match templates.get(&key) {
                    None => {
                        debug!("v9: data flowset for unseen template {id} from {exporter}, dropping");
                        if let Some(buf) = forward_body.as_mut() {
                            buf.extend_from_slice(&flow_set_id.to_be_bytes());
                            buf.extend_from_slice(&(length as u16).to_be_bytes());
                            buf.extend_from_slice(body);
                        }
                    }
                    Some(def) => {
                        let (records, fwd_body) = decode_data_flowset(body, &def, resolver);
                        outcome.records.extend(records);
                        if let Some(buf) = forward_body.as_mut() {
                            if def.is_option {
                                buf.extend_from_slice(&flow_set_id.to_be_bytes());
                                buf.extend_from_slice(&(length as u16).to_be_bytes());
                                buf.extend_from_slice(body);
                            } else {
                                let new_length = 4 + fwd_body.len();
                                buf.extend_from_slice(&flow_set_id.to_be_bytes());
                                buf.extend_from_slice(&(new_length as u16).to_be_bytes());
                                buf.extend_from_slice(&fwd_body);
                            }
                        }
                    }
                }
            }
            other => {
                // Spec §7: drop the record (here, the remainder of this
                // flowset) and continue with the rest of the datagram
                // rather than failing it outright.
                debug!("v9: unknown flowset id {other} from {exporter}, skipping set");
            }
        }

        cursor = next_cursor;
    }

    if let Some(body) = forward_body {
        let mut datagram = Vec::with_capacity(20 + body.len());
        write_header(&mut datagram, &header);
        datagram.extend_from_slice(&body);
        outcome.forward_datagram = Some(datagram);
    }

    Ok(outcome)
}

/// Parses consecutive `(template_id, field_count, fields...)` records out of
/// an ordinary (non-options) template flowset body.
fn parse_template_records(body: &[u8]) -> Vec<(u16, TemplateDef)> {
    let mut out = Vec::new();
    let mut cursor = body;
    while cursor.len() >= 4 {
        let (rest, template_id) = match be_u16::<_, nom::error::Error<&[u8]>>(cursor) {
            Ok(v) => v,
            Err(_) => break,
        };
        let (rest, field_count) = match be_u16::<_, nom::error::Error<&[u8]>>(rest) {
            Ok(v) => v,
            Err(_) => break,
        };
        let needed = field_count as usize * 4;
        if rest.len() < needed {
            break;
        }
        let (fields_bytes, remainder) = rest.split_at(needed);
        let fields = read_field_pairs(fields_bytes, field_count as usize);
        out.push((template_id, TemplateDef::new(fields)));
        cursor = remainder;
    }
    out
}

fn parse_options_template_records(body: &[u8]) -> Vec<(u16, TemplateDef)> {
    let mut out = Vec::new();
    let mut cursor = body;
    while cursor.len() >= 6 {
        let (rest, template_id) = match be_u16::<_, nom::error::Error<&[u8]>>(cursor) {
            Ok(v) => v,
            Err(_) => break,
        };
        let (rest, scope_len) = match be_u16::<_, nom::error::Error<&[u8]>>(rest) {
            Ok(v) => v,
            Err(_) => break,
        };
        let (rest, option_len) = match be_u16::<_, nom::error::Error<&[u8]>>(rest) {
            Ok(v) => v,
            Err(_) => break,
        };
        let total = scope_len as usize + option_len as usize;
        if rest.len() < total {
            break;
        }
        let (scope_bytes, rest2) = rest.split_at(scope_len as usize);
        let (option_bytes, remainder) = rest2.split_at(option_len as usize);

        let mut fields = read_field_pairs(scope_bytes, scope_bytes.len() / 4);
        fields.extend(read_field_pairs(option_bytes, option_bytes.len() / 4));

        out.push((template_id, TemplateDef::option(fields)));
        cursor = remainder;
    }
    out
}

fn read_field_pairs(bytes: &[u8], count: usize) -> Vec<(u16, u16)> {
    let mut fields = Vec::with_capacity(count);
    let mut cursor = bytes;
    for _ in 0..count {
        let Ok((rest, id)) = be_u16::<_, nom::error::Error<&[u8]>>(cursor) else {
            break;
        };
        let Ok((rest, len)) = be_u16::<_, nom::error::Error<&[u8]>>(rest) else {
            break;
        };
        fields.push((id, len));
        cursor = rest;
    }
    fields
}

fn emit_template_flowset(buf: &mut Vec<u8>, flowset_id: u16, records: &[(u16, TemplateDef)]) {
    let mut body = Vec::new();
    for (template_id, def) in records {
        body.extend_from_slice(&template_id.to_be_bytes());
        body.extend_from_slice(&((def.fields.len() + fields::FORWARD_SYNTHETIC_FIELDS.len()) as u16).to_be_bytes());
        for (id, len) in &def.fields {
            body.extend_from_slice(&id.to_be_bytes());
            body.extend_from_slice(&len.to_be_bytes());
        }
        for (id, len) in fields::FORWARD_SYNTHETIC_FIELDS {
            body.extend_from_slice(&id.to_be_bytes());
            body.extend_from_slice(&len.to_be_bytes());
        }
    }
    buf.extend_from_slice(&flowset_id.to_be_bytes());
    buf.extend_from_slice(&((4 + body.len()) as u16).to_be_bytes());
    buf.extend_from_slice(&body);
}

/// Decodes every fixed-length record in a data flowset body against `def`,
/// returning the enrichment summaries and (always, regardless of whether
/// the caller uses it) the forward-ready body with per-record ASNs
/// appended.
fn decode_data_flowset(
    body: &[u8],
    def: &TemplateDef,
    resolver: Option<&AsnResolver>,
) -> (Vec<FlowSummary>, Vec<u8>) {
    let record_len = def.record_len();
    let mut summaries = Vec::new();
    let mut forward_body = Vec::new();

    if record_len == 0 {
        return (summaries, forward_body);
    }

    let mut cursor = body;
    while cursor.len() >= record_len {
        let record = &cursor[..record_len];
        cursor = &cursor[record_len..];

        let src_ip = fields::find_u32_field(&def.fields, record, IPV4_SRC_ADDR).map(Ipv4Addr::from);
        let dst_ip = fields::find_u32_field(&def.fields, record, IPV4_DST_ADDR).map(Ipv4Addr::from);

        let (src_asn, dst_asn) = match resolver {
            Some(resolver) => (
                src_ip.map(|ip| resolver.resolve(IpAddr::V4(ip))).unwrap_or(Asn::UNKNOWN),
                dst_ip.map(|ip| resolver.resolve(IpAddr::V4(ip))).unwrap_or(Asn::UNKNOWN),
            ),
            None => (Asn::UNKNOWN, Asn::UNKNOWN),
        };

        summaries.push(FlowSummary {
            src_ip,
            dst_ip,
            src_asn,
            dst_asn,
        });

        forward_body.extend_from_slice(record);
        forward_body.extend_from_slice(&src_asn.0.to_be_bytes());
        forward_body.extend_from_slice(&dst_asn.0.to_be_bytes());
    }

    (summaries, forward_body)
}
