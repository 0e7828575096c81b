//! Pure routing of rumqttc events
//!
//! The session event loop turns every [`Event`] into an [`EventRoute`] and
//! acts on the route. Keeping the decision here lets it be tested without a
//! broker.

use super::acks::AckKind;
use bytes::Bytes;
use rumqttc::{ConnectReturnCode, Event, Outgoing, Packet, SubscribeReasonCode};

/// What the event loop should do with an event
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    /// Broker accepted the connection
    ConnectionAcknowledged { session_present: bool },
    /// Broker answered CONNECT with a refusal code
    ConnectionRefused(String),
    /// Inbound application message
    MessageReceived { topic: String, payload: Bytes },
    /// A request left the client with this packet id
    RequestSent { kind: AckKind, pkid: u16 },
    /// The final acknowledgment for a request arrived
    Acknowledged { kind: AckKind, pkid: u16 },
    /// SUBACK carried a failure return code
    SubscriptionRejected { pkid: u16 },
    /// Broker closed the session
    Disconnected,
    /// Our own DISCONNECT was sent
    ClientDisconnecting,
    /// Keep-alive and intermediate QoS 2 traffic
    Infrastructure,
}

/// Stateless event classifier
pub struct MessageHandler;

impl MessageHandler {
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(packet) => Self::route_incoming(packet),
            Event::Outgoing(outgoing) => Self::route_outgoing(outgoing),
        }
    }

    fn route_incoming(packet: &Packet) -> EventRoute {
        match packet {
            Packet::ConnAck(ack) if ack.code == ConnectReturnCode::Success => {
                EventRoute::ConnectionAcknowledged {
                    session_present: ack.session_present,
                }
            }
            Packet::ConnAck(ack) => EventRoute::ConnectionRefused(format!("{:?}", ack.code)),
            Packet::Publish(publish) => EventRoute::MessageReceived {
                topic: publish.topic.clone(),
                payload: publish.payload.clone(),
            },
            Packet::PubAck(ack) => EventRoute::Acknowledged {
                kind: AckKind::Publish,
                pkid: ack.pkid,
            },
            Packet::PubComp(comp) => EventRoute::Acknowledged {
                kind: AckKind::Publish,
                pkid: comp.pkid,
            },
            Packet::SubAck(suback) => {
                let rejected = suback
                    .return_codes
                    .iter()
                    .any(|code| matches!(code, SubscribeReasonCode::Failure));
                if rejected {
                    EventRoute::SubscriptionRejected { pkid: suback.pkid }
                } else {
                    EventRoute::Acknowledged {
                        kind: AckKind::Subscribe,
                        pkid: suback.pkid,
                    }
                }
            }
            Packet::UnsubAck(unsuback) => EventRoute::Acknowledged {
                kind: AckKind::Unsubscribe,
                pkid: unsuback.pkid,
            },
            Packet::Disconnect => EventRoute::Disconnected,
            _ => EventRoute::Infrastructure,
        }
    }

    fn route_outgoing(outgoing: &Outgoing) -> EventRoute {
        match outgoing {
            Outgoing::Publish(pkid) => EventRoute::RequestSent {
                kind: AckKind::Publish,
                pkid: *pkid,
            },
            Outgoing::Subscribe(pkid) => EventRoute::RequestSent {
                kind: AckKind::Subscribe,
                pkid: *pkid,
            },
            Outgoing::Unsubscribe(pkid) => EventRoute::RequestSent {
                kind: AckKind::Unsubscribe,
                pkid: *pkid,
            },
            Outgoing::Disconnect => EventRoute::ClientDisconnecting,
            _ => EventRoute::Infrastructure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::{ConnAck, PubAck, PubComp, PubRec, Publish, QoS, SubAck, UnsubAck};

    #[test]
    fn test_route_connack() {
        let accepted = Event::Incoming(Packet::ConnAck(ConnAck {
            session_present: true,
            code: ConnectReturnCode::Success,
        }));
        assert_eq!(
            MessageHandler::route_mqtt_event(&accepted),
            EventRoute::ConnectionAcknowledged {
                session_present: true
            }
        );

        let refused = Event::Incoming(Packet::ConnAck(ConnAck {
            session_present: false,
            code: ConnectReturnCode::NotAuthorized,
        }));
        assert!(matches!(
            MessageHandler::route_mqtt_event(&refused),
            EventRoute::ConnectionRefused(code) if code.contains("NotAuthorized")
        ));
    }

    #[test]
    fn test_route_publish() {
        let publish = Event::Incoming(Packet::Publish(Publish::new(
            "x/y",
            QoS::ExactlyOnce,
            b"payload".to_vec(),
        )));
        assert_eq!(
            MessageHandler::route_mqtt_event(&publish),
            EventRoute::MessageReceived {
                topic: "x/y".to_string(),
                payload: Bytes::from_static(b"payload"),
            }
        );
    }

    #[test]
    fn test_route_acknowledgments() {
        assert_eq!(
            MessageHandler::route_mqtt_event(&Event::Incoming(Packet::PubAck(PubAck::new(3)))),
            EventRoute::Acknowledged {
                kind: AckKind::Publish,
                pkid: 3
            }
        );
        assert_eq!(
            MessageHandler::route_mqtt_event(&Event::Incoming(Packet::PubComp(PubComp::new(4)))),
            EventRoute::Acknowledged {
                kind: AckKind::Publish,
                pkid: 4
            }
        );
        assert_eq!(
            MessageHandler::route_mqtt_event(&Event::Incoming(Packet::UnsubAck(UnsubAck::new(
                5
            )))),
            EventRoute::Acknowledged {
                kind: AckKind::Unsubscribe,
                pkid: 5
            }
        );
        // PUBREC is only the midpoint of the QoS 2 exchange
        assert_eq!(
            MessageHandler::route_mqtt_event(&Event::Incoming(Packet::PubRec(PubRec::new(4)))),
            EventRoute::Infrastructure
        );
    }

    #[test]
    fn test_route_suback() {
        let granted = Event::Incoming(Packet::SubAck(SubAck::new(
            7,
            vec![SubscribeReasonCode::Success(QoS::ExactlyOnce)],
        )));
        assert_eq!(
            MessageHandler::route_mqtt_event(&granted),
            EventRoute::Acknowledged {
                kind: AckKind::Subscribe,
                pkid: 7
            }
        );

        let rejected = Event::Incoming(Packet::SubAck(SubAck::new(
            8,
            vec![SubscribeReasonCode::Failure],
        )));
        assert_eq!(
            MessageHandler::route_mqtt_event(&rejected),
            EventRoute::SubscriptionRejected { pkid: 8 }
        );
    }

    #[test]
    fn test_route_outgoing() {
        assert_eq!(
            MessageHandler::route_mqtt_event(&Event::Outgoing(Outgoing::Publish(0))),
            EventRoute::RequestSent {
                kind: AckKind::Publish,
                pkid: 0
            }
        );
        assert_eq!(
            MessageHandler::route_mqtt_event(&Event::Outgoing(Outgoing::Subscribe(2))),
            EventRoute::RequestSent {
                kind: AckKind::Subscribe,
                pkid: 2
            }
        );
        assert_eq!(
            MessageHandler::route_mqtt_event(&Event::Outgoing(Outgoing::Disconnect)),
            EventRoute::ClientDisconnecting
        );
        assert_eq!(
            MessageHandler::route_mqtt_event(&Event::Outgoing(Outgoing::PingReq)),
            EventRoute::Infrastructure
        );
    }

    #[test]
    fn test_route_broker_disconnect() {
        assert_eq!(
            MessageHandler::route_mqtt_event(&Event::Incoming(Packet::Disconnect)),
            EventRoute::Disconnected
        );
    }
}
