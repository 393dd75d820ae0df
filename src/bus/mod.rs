use bytes::Bytes;

pub mod chunking;
pub mod ports;

/// Topic suffixes of the device's bus namespace. Every concrete topic is
/// `"{MAC}{suffix}"` with the MAC as 12 uppercase hex chars.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Topic {
    ConnectionRequest,
    ConnectionResponse,
    Monitor,
    OneWire,
    ConfigRequest,
    ConfigResponse,
    ConfigReceive,
    ChildrenListener,
}

impl Topic {
    pub const ALL: [Topic; 8] = [
        Topic::ConnectionRequest,
        Topic::ConnectionResponse,
        Topic::Monitor,
        Topic::OneWire,
        Topic::ConfigRequest,
        Topic::ConfigResponse,
        Topic::ConfigReceive,
        Topic::ChildrenListener,
    ];

    #[inline]
    pub fn suffix(&self) -> &'static str {
        match self {
            Topic::ConnectionRequest => "/connection_request",
            Topic::ConnectionResponse => "/connection_response",
            Topic::Monitor => "/monitor",
            Topic::OneWire => "/one_wire",
            Topic::ConfigRequest => "/config_request",
            Topic::ConfigResponse => "/config_response",
            Topic::ConfigReceive => "/config_device",
            Topic::ChildrenListener => "/children_listener",
        }
    }
}

/// Fully-qualified topic strings for one device MAC.
#[derive(Debug, Clone)]
pub struct Topics {
    mac: String,
}

impl Topics {
    pub fn for_mac(mac: impl Into<String>) -> Self {
        Self { mac: mac.into() }
    }

    #[inline]
    pub fn mac(&self) -> &str {
        &self.mac
    }

    pub fn topic(&self, t: Topic) -> String {
        format!("{}{}", self.mac, t.suffix())
    }

    /// Listener topic of another device (a parent), by its MAC.
    pub fn children_listener_of(parent_mac: &str) -> String {
        format!("{}{}", parent_mac, Topic::ChildrenListener.suffix())
    }
}

/// Connection-protocol payloads accepted on `/connection_request`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ConnectionMsg {
    Connect,
    Present,
    Disconnect,
}

impl ConnectionMsg {
    pub fn parse(payload: &[u8]) -> Option<Self> {
        match payload {
            b"Connect" => Some(ConnectionMsg::Connect),
            b"Present" => Some(ConnectionMsg::Present),
            b"Disconnect" => Some(ConnectionMsg::Disconnect),
            _ => None,
        }
    }
}

/// Inbound event delivered by a transport adapter. The core does not
/// care whether the bytes arrived over MQTT or BLE writes.
#[derive(Debug, Clone)]
pub enum IngressEvent {
    /// One chunk of a configuration document.
    ConfigChunk(Bytes),
    /// Request to re-publish the persisted configuration blob.
    ConfigRequest,
    /// Connection-protocol message from the authoring app.
    Connection(ConnectionMsg),
    /// Flat `{name: value}` delta from a child device.
    ChildrenUpdate(Bytes),
    /// Transport (re)connected to the broker.
    BusUp,
    /// Transport lost the broker.
    BusDown,
}

/// Outbound publication handed to a transport adapter.
#[derive(Debug, Clone)]
pub struct Publication {
    pub topic: String,
    pub payload: Bytes,
    pub qos: u8,
}

impl Publication {
    pub fn new(topic: String, payload: impl Into<Bytes>, qos: u8) -> Self {
        Self {
            topic,
            payload: payload.into(),
            qos,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_carry_mac_prefix() {
        let t = Topics::for_mac("A1B2C3D4E5F6");
        assert_eq!(t.topic(Topic::Monitor), "A1B2C3D4E5F6/monitor");
        assert_eq!(
            Topics::children_listener_of("ABCDEF"),
            "ABCDEF/children_listener"
        );
    }

    #[test]
    fn connection_payloads_parse_exactly() {
        assert_eq!(
            ConnectionMsg::parse(b"Connect"),
            Some(ConnectionMsg::Connect)
        );
        assert_eq!(
            ConnectionMsg::parse(b"Present"),
            Some(ConnectionMsg::Present)
        );
        assert_eq!(ConnectionMsg::parse(b"connect"), None);
    }
}
