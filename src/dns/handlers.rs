use crate::config::SharedConfig;
use crate::dns::axfr::{self, ENVELOPE_LIMIT};
use crate::dns::register::{is_registration, Registrar};
use crate::dns::resolver::find_location;
use crate::dns::synth::{RecordKind, Synthesized, Synthesizer};
use crate::dns::zone_set::ZoneSet;
use crate::error::Error;
use crate::kv_store::ZoneStore;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use trust_dns_proto::op::{Edns, Header, Message, MessageType, OpCode, Query, ResponseCode};
use trust_dns_proto::rr::{Name, Record, RecordType};
use trust_dns_proto::serialize::binary::BinEncodable;
use trust_dns_server::authority::MessageResponseBuilder;
use trust_dns_server::server::{Protocol, Request, RequestHandler, ResponseHandler, ResponseInfo};

/// Smallest UDP payload every resolver must accept.
const MIN_PAYLOAD: u16 = 512;

/// What the server replies to one query.
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    /// None of the zones covers the query name. The request goes to the next handler.
    NotAuthoritative,
    /// An empty reply with the given response code.
    Error(ResponseCode),
    /// An authoritative reply. No answers at all means the name exists without data of the
    /// requested type.
    Records(Synthesized),
    /// A zone transfer, sent as a sequence of envelopes.
    Transfer(Vec<Record>),
}

/// Authoritative handler for every zone of the [`ZoneSet`]. Queries outside of those zones are
/// passed to the `next` handler untouched.
#[derive(Clone)]
pub struct Handler<N = Refused> {
    config: SharedConfig,
    store: ZoneStore,
    zone_set: Arc<ZoneSet>,
    registrar: Arc<Registrar>,
    next: N,
}

impl Handler {
    pub fn new(config: SharedConfig, store: ZoneStore, zone_set: Arc<ZoneSet>) -> Self {
        let registrar = Arc::new(Registrar::new(config.clone(), store.clone()));
        Handler {
            config,
            store,
            zone_set,
            registrar,
            next: Refused,
        }
    }
}

impl<N> Handler<N> {
    /// Replace the handler receiving queries this server isn't authoritative for.
    pub fn with_next<M: RequestHandler>(self, next: M) -> Handler<M> {
        Handler {
            config: self.config,
            store: self.store,
            zone_set: self.zone_set,
            registrar: self.registrar,
            next,
        }
    }

    /// Work out the answer to a `qtype` query for the lower-cased, fully qualified `qname`
    /// asked by `client`.
    ///
    /// # Errors
    ///
    /// Returns store and DNS protocol errors. They are answered with `SERVFAIL`.
    pub async fn answer(
        &self,
        qname: &str,
        qtype: RecordType,
        client: IpAddr,
    ) -> Result<Answer, Error> {
        self.zone_set.refresh_if_stale().await;
        let Some(zone_name) = self.zone_set.matching(qname).await else {
            return Ok(Answer::NotAuthoritative);
        };

        let zone = match self.store.load_zone(&zone_name).await? {
            Some(zone) => zone,
            None => {
                warn!("zone {zone_name} has no locations");
                return Ok(Answer::Error(ResponseCode::ServFail));
            }
        };
        let synth = Synthesizer::new(&self.store, &zone, self.config.ttl);

        if qtype == RecordType::AXFR {
            info!(%client, "zone transfer of {zone_name}");
            return Ok(Answer::Transfer(axfr::transfer(&synth).await?));
        }

        let Some(location) = find_location(qname, &zone) else {
            if qtype == RecordType::TXT && is_registration(qname) {
                let answer = match self.registrar.register(qname, &zone, client).await? {
                    Some(confirmation) => Answer::Records(Synthesized {
                        answers: vec![confirmation],
                        extras: Vec::new(),
                    }),
                    None => Answer::Error(ResponseCode::NXDomain),
                };
                return Ok(answer);
            }
            return Ok(Answer::Error(ResponseCode::NXDomain));
        };

        let Some(kind) = RecordKind::from_record_type(qtype) else {
            return Ok(Answer::Error(ResponseCode::NotImp));
        };
        let owner = Name::from_str(qname)?;
        let record = self.store.record(&zone, &location).await?;
        Ok(Answer::Records(
            synth.synthesize(kind, &owner, record.as_ref()).await?,
        ))
    }

    fn log_query(&self, client: IpAddr, qtype: RecordType, qname: &str) {
        if self.config.verbose {
            info!("{client} - [query] {qtype} {qname}");
        } else {
            debug!("{client} - [query] {qtype} {qname}");
        }
    }
}

impl<N: RequestHandler> Handler<N> {
    async fn dispatch_request<R: ResponseHandler>(
        &self,
        request: &Request,
        response: R,
    ) -> Result<ResponseInfo, Error> {
        // If it isn't a query, return NOTIMPL.
        if request.op_code() != OpCode::Query || request.message_type() != MessageType::Query {
            return send_error(request, response, ResponseCode::NotImp).await;
        }

        let client = request.src().ip();
        let qtype = request.query().query_type();
        let qname = request.query().name().to_string().trim().to_lowercase();
        self.log_query(client, qtype, &qname);

        let answer = match self.answer(&qname, qtype, client).await {
            Ok(answer) => answer,
            Err(err) => {
                error!(%client, "error answering {qtype} {qname}: {err}");
                Answer::Error(ResponseCode::ServFail)
            }
        };

        match answer {
            Answer::NotAuthoritative => Ok(self.next.handle_request(request, response).await),
            Answer::Error(code) => send_error(request, response, code).await,
            Answer::Records(synthesized) => send_records(request, response, &synthesized).await,
            Answer::Transfer(records) => send_transfer(request, response, records).await,
        }
    }
}

/// EDNS for the reply, if the request carried any: version 0 and a payload size never below
/// the protocol minimum.
fn edns(request: &Request) -> Option<Edns> {
    request.edns().map(|requested| {
        let mut edns = Edns::new();
        edns.set_max_payload(requested.max_payload().max(MIN_PAYLOAD));
        edns.set_version(0);
        edns
    })
}

/// Largest reply the requester accepts, for transports that have a limit.
fn max_payload(request: &Request) -> Option<usize> {
    match request.protocol() {
        Protocol::Udp => Some(usize::from(
            request
                .edns()
                .map_or(MIN_PAYLOAD, |edns| edns.max_payload().max(MIN_PAYLOAD)),
        )),
        _ => None,
    }
}

/// Wire length of the reply to `request` carrying `answers` and `extras`.
fn encoded_len(request: &Request, header: Header, answers: &[Record], extras: &[Record]) -> usize {
    let query = request.query();
    let mut message = Message::new();
    message
        .set_header(header)
        .add_query(Query::query(query.name().into(), query.query_type()));
    message.add_answers(answers.iter().cloned());
    message.add_additionals(extras.iter().cloned());
    if let Some(edns) = edns(request) {
        message.set_edns(edns);
    }
    BinEncodable::to_bytes(&message).map_or(usize::MAX, |bytes| bytes.len())
}

/// Drop records until the reply fits the requester's transport. Additional records go first;
/// losing an answer sets the TC bit so the client retries over TCP.
fn fit_to_transport(
    request: &Request,
    header: &mut Header,
    answers: &mut Vec<Record>,
    extras: &mut Vec<Record>,
) {
    let Some(limit) = max_payload(request) else {
        return;
    };
    while encoded_len(request, *header, answers, extras) > limit {
        if extras.pop().is_some() {
            continue;
        }
        if answers.pop().is_none() {
            break;
        }
        header.set_truncated(true);
    }
}

fn response_header(request: &Request) -> Header {
    let mut header = Header::response_from_request(request.header());
    header.set_authoritative(true);
    header.set_recursion_available(false);
    header
}

fn response_builder(request: &Request) -> MessageResponseBuilder<'_> {
    let mut builder = MessageResponseBuilder::from_message_request(request);
    if let Some(edns) = edns(request) {
        builder.edns(edns);
    }
    builder
}

async fn send_error<R: ResponseHandler>(
    request: &Request,
    mut response_handle: R,
    code: ResponseCode,
) -> Result<ResponseInfo, Error> {
    let mut header = response_header(request);
    header.set_response_code(code);
    let response = response_builder(request).build_no_records(header);
    Ok(response_handle.send_response(response).await?)
}

async fn send_records<R: ResponseHandler>(
    request: &Request,
    mut response_handle: R,
    synthesized: &Synthesized,
) -> Result<ResponseInfo, Error> {
    let mut header = response_header(request);
    let mut answers = synthesized.answers.clone();
    let mut extras = synthesized.extras.clone();
    fit_to_transport(request, &mut header, &mut answers, &mut extras);

    let response =
        response_builder(request).build(header, answers.iter(), &[], &[], extras.iter());
    Ok(response_handle.send_response(response).await?)
}

/// Stream a zone transfer, one message per envelope.
async fn send_transfer<R: ResponseHandler>(
    request: &Request,
    mut response_handle: R,
    records: Vec<Record>,
) -> Result<ResponseInfo, Error> {
    let mut envelopes = axfr::spawn_envelopes(records, ENVELOPE_LIMIT);
    let mut info = None;
    while let Some(mut envelope) = envelopes.recv().await {
        let mut header = response_header(request);
        fit_to_transport(request, &mut header, &mut envelope, &mut Vec::new());
        let response = response_builder(request).build(header, envelope.iter(), &[], &[], &[]);
        info = Some(response_handle.send_response(response).await?);
    }
    Ok(info.unwrap_or_else(|| response_header(request).into()))
}

/// Fallback handler answering every query with `REFUSED`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Refused;

#[async_trait::async_trait]
impl RequestHandler for Refused {
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        response_handle: R,
    ) -> ResponseInfo {
        match send_error(request, response_handle, ResponseCode::Refused).await {
            Ok(info) => info,
            Err(error) => {
                error!("error refusing request: {:?}", error);
                let mut header = Header::new();
                header.set_response_code(ResponseCode::ServFail);
                header.into()
            }
        }
    }
}

#[async_trait::async_trait]
impl<N: RequestHandler> RequestHandler for Handler<N> {
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        response_handle: R,
    ) -> ResponseInfo {
        match self.dispatch_request(request, response_handle).await {
            Ok(info) => info,
            Err(error) => {
                error!("error in RequestHandler: {:?}", error);
                let mut header = Header::new();
                header.set_response_code(ResponseCode::ServFail);
                header.into()
            }
        }
    }
}
