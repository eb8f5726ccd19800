//! Adapter boundary between the decoded MQTT byte stream (`rumq_core`)
//! and this crate's own [`Packet`] model.
//!
//! This is deliberately the only module that names `rumq_core::mqtt4`
//! types: every other subsystem in the broker works exclusively with
//! [`Packet`] and [`InboundEvent`], matching the spec's framing of the
//! physical listener and frame codec as an external collaborator that
//! merely produces decoded packets and accepts encoded ones.

use rumq_core::mqtt4::{
    Connect, MqttCodec, Packet as WirePacket, Publish, QoS as WireQos, SubscribeTopic,
};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use crate::packet::{Packet, Qos};

/// A decoded/encoded frame stream over one accepted TCP connection. This
/// is the only place `rumq_core`'s codec type is named.
pub type WireStream = Framed<TcpStream, MqttCodec>;

#[must_use]
pub fn framed(stream: TcpStream) -> WireStream {
    Framed::new(stream, MqttCodec::new())
}

/// A decoded inbound frame, translated into the shapes the session state
/// machine (§4.4) switches on.
#[derive(Debug)]
pub enum InboundEvent {
    Connect {
        client_id: String,
        clean_session: bool,
        keep_alive: u16,
        username: Option<String>,
        password: Option<Vec<u8>>,
        will: Option<Packet>,
    },
    Publish(Packet),
    Subscribe {
        pkid: u16,
        filters: Vec<(String, Qos)>,
    },
    Unsubscribe {
        pkid: u16,
        filters: Vec<String>,
    },
    PubAck {
        message_id: u16,
    },
    PingReq,
    Disconnect,
}

fn wire_qos_to_qos(qos: WireQos) -> Qos {
    Qos::downgrade(qos as u8)
}

fn qos_to_wire_qos(qos: Qos) -> WireQos {
    match qos {
        Qos::AtMostOnce => WireQos::AtMostOnce,
        Qos::AtLeastOnce => WireQos::AtLeastOnce,
    }
}

fn publish_to_packet(publish: &Publish) -> Packet {
    Packet {
        topic: publish.topic_name.clone(),
        payload: publish.payload.as_ref().clone(),
        qos: wire_qos_to_qos(publish.qos),
        message_id: publish.pkid,
        retain: publish.retain,
    }
}

fn connect_will(connect: &Connect) -> Option<Packet> {
    connect.last_will.as_ref().map(|will| Packet {
        topic: will.topic.clone(),
        payload: will.message.clone().into_bytes(),
        qos: wire_qos_to_qos(will.qos),
        message_id: None,
        retain: will.retain,
    })
}

/// Translates one decoded `rumq_core` packet into the broker's own event
/// model. Returns `None` for packets this broker never expects from a
/// client (CONNACK, SUBACK, ...); the caller treats that as a protocol
/// error.
#[must_use]
pub fn from_wire(packet: WirePacket) -> Option<InboundEvent> {
    match packet {
        WirePacket::Connect(connect) => Some(InboundEvent::Connect {
            client_id: connect.client_id.clone(),
            clean_session: connect.clean_session,
            keep_alive: connect.keep_alive,
            username: connect.username.clone(),
            password: connect.password.clone().map(String::into_bytes),
            will: connect_will(&connect),
        }),
        WirePacket::Publish(publish) => Some(InboundEvent::Publish(publish_to_packet(&publish))),
        WirePacket::Subscribe(subscribe) => Some(InboundEvent::Subscribe {
            pkid: subscribe.pkid,
            filters: subscribe
                .topics
                .into_iter()
                .map(|t: SubscribeTopic| (t.topic_path, wire_qos_to_qos(t.qos)))
                .collect(),
        }),
        WirePacket::Unsubscribe(unsubscribe) => Some(InboundEvent::Unsubscribe {
            pkid: unsubscribe.pkid,
            filters: unsubscribe.topics,
        }),
        WirePacket::Puback(pkid) => Some(InboundEvent::PubAck { message_id: pkid }),
        WirePacket::Pingreq => Some(InboundEvent::PingReq),
        WirePacket::Disconnect => Some(InboundEvent::Disconnect),
        _ => None,
    }
}

/// Builds the wire PUBLISH frame for an outbound delivery.
#[must_use]
pub fn publish_to_wire(packet: &Packet) -> WirePacket {
    let mut publish = rumq_core::mqtt4::publish(
        packet.topic.clone(),
        qos_to_wire_qos(packet.qos),
        packet.payload.clone(),
    );
    publish.retain = packet.retain;
    publish.pkid = packet.message_id;
    WirePacket::Publish(publish)
}

#[must_use]
pub fn connack_accepted() -> WirePacket {
    WirePacket::Connack(rumq_core::mqtt4::Connack {
        session_present: false,
        code: rumq_core::mqtt4::ConnectReturnCode::Accepted,
    })
}

#[must_use]
pub fn connack_not_authorized() -> WirePacket {
    WirePacket::Connack(rumq_core::mqtt4::Connack {
        session_present: false,
        code: rumq_core::mqtt4::ConnectReturnCode::NotAuthorized,
    })
}

#[must_use]
pub fn puback(message_id: u16) -> WirePacket {
    WirePacket::Puback(message_id)
}

#[must_use]
pub fn pingresp() -> WirePacket {
    WirePacket::Pingresp
}

/// `None` entries (authorization denied) encode as the 0x80 failure
/// return code per [MQTT-3.9.3-2].
#[must_use]
pub fn suback(pkid: u16, granted: Vec<Option<Qos>>) -> WirePacket {
    WirePacket::Suback(rumq_core::mqtt4::Suback {
        pkid,
        return_codes: granted
            .into_iter()
            .map(|q| match q {
                Some(q) => rumq_core::mqtt4::SubscribeReturnCodes::Success(qos_to_wire_qos(q)),
                None => rumq_core::mqtt4::SubscribeReturnCodes::Failure,
            })
            .collect(),
    })
}

#[must_use]
pub fn unsuback(pkid: u16) -> WirePacket {
    WirePacket::Unsuback(pkid)
}
