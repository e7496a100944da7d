//! OSC message and packet types

use std::fmt;

use crate::error::{AppError, Result};

/// A single typed OSC argument
#[derive(Debug, Clone, PartialEq)]
pub enum OscArg {
    Int(i32),
    Float(f32),
    Str(String),
}

impl OscArg {
    /// Type tag character for this argument
    pub fn tag(&self) -> char {
        match self {
            OscArg::Int(_) => 'i',
            OscArg::Float(_) => 'f',
            OscArg::Str(_) => 's',
        }
    }
}

impl fmt::Display for OscArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OscArg::Int(v) => write!(f, "i:{}", v),
            OscArg::Float(v) => write!(f, "f:{}", v),
            OscArg::Str(v) => write!(f, "s:{}", v),
        }
    }
}

impl From<i32> for OscArg {
    fn from(v: i32) -> Self {
        OscArg::Int(v)
    }
}

impl From<f32> for OscArg {
    fn from(v: f32) -> Self {
        OscArg::Float(v)
    }
}

impl From<&str> for OscArg {
    fn from(v: &str) -> Self {
        OscArg::Str(v.to_string())
    }
}

impl From<String> for OscArg {
    fn from(v: String) -> Self {
        OscArg::Str(v)
    }
}

impl From<&String> for OscArg {
    fn from(v: &String) -> Self {
        OscArg::Str(v.clone())
    }
}

/// An address path plus its argument list
#[derive(Debug, Clone, PartialEq)]
pub struct OscMessage {
    pub address: String,
    pub args: Vec<OscArg>,
}

impl OscMessage {
    pub fn new(address: impl Into<String>, args: Vec<OscArg>) -> Self {
        Self {
            address: address.into(),
            args,
        }
    }

    /// String argument at `index`
    pub fn str_arg(&self, index: usize) -> Result<&str> {
        match self.args.get(index) {
            Some(OscArg::Str(s)) => Ok(s.as_str()),
            Some(other) => Err(AppError::MalformedMessage(format!(
                "{}: argument {} should be a string, got {}",
                self.address, index, other
            ))),
            None => Err(self.missing(index)),
        }
    }

    /// Integer argument at `index`
    pub fn i32_arg(&self, index: usize) -> Result<i32> {
        match self.args.get(index) {
            Some(OscArg::Int(v)) => Ok(*v),
            Some(other) => Err(AppError::MalformedMessage(format!(
                "{}: argument {} should be an int, got {}",
                self.address, index, other
            ))),
            None => Err(self.missing(index)),
        }
    }

    /// Float argument at `index`. Integers are widened.
    pub fn f32_arg(&self, index: usize) -> Result<f32> {
        match self.args.get(index) {
            Some(OscArg::Float(v)) => Ok(*v),
            Some(OscArg::Int(v)) => Ok(*v as f32),
            Some(other) => Err(AppError::MalformedMessage(format!(
                "{}: argument {} should be a float, got {}",
                self.address, index, other
            ))),
            None => Err(self.missing(index)),
        }
    }

    /// Integer argument that must fit a port number
    pub fn port_arg(&self, index: usize) -> Result<u16> {
        let value = self.i32_arg(index)?;
        u16::try_from(value).map_err(|_| {
            AppError::MalformedMessage(format!(
                "{}: argument {} is not a valid port: {}",
                self.address, index, value
            ))
        })
    }

    /// Type tag string, including the leading comma
    pub fn type_tags(&self) -> String {
        let mut tags = String::with_capacity(self.args.len() + 1);
        tags.push(',');
        tags.extend(self.args.iter().map(OscArg::tag));
        tags
    }

    fn missing(&self, index: usize) -> AppError {
        AppError::MalformedMessage(format!(
            "{}: missing argument {} (got {})",
            self.address,
            index,
            self.args.len()
        ))
    }
}

impl fmt::Display for OscMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.address, self.type_tags())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// A message or an ordered group of packets
#[derive(Debug, Clone, PartialEq)]
pub enum OscPacket {
    Message(OscMessage),
    Bundle(Vec<OscPacket>),
}

impl OscPacket {
    /// Flatten bundles, preserving element order
    pub fn into_messages(self) -> Vec<OscMessage> {
        let mut out = Vec::new();
        self.collect_into(&mut out);
        out
    }

    fn collect_into(self, out: &mut Vec<OscMessage>) {
        match self {
            OscPacket::Message(msg) => out.push(msg),
            OscPacket::Bundle(elements) => {
                for element in elements {
                    element.collect_into(out);
                }
            }
        }
    }
}

impl From<OscMessage> for OscPacket {
    fn from(msg: OscMessage) -> Self {
        OscPacket::Message(msg)
    }
}

/// Build an [`OscMessage`] from an address and a list of convertible args
///
/// ```
/// use peerview::osc_msg;
/// let msg = osc_msg!("/SPIN/default", "refresh");
/// assert_eq!(msg.args.len(), 1);
/// ```
#[macro_export]
macro_rules! osc_msg {
    ($addr:expr $(, $arg:expr)* $(,)?) => {
        $crate::osc::OscMessage::new($addr, vec![$($crate::osc::OscArg::from($arg)),*])
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_accessors() {
        let msg = OscMessage::new(
            "/SPIN/__server__",
            vec!["default".into(), OscArg::Int(54324), OscArg::Float(1.5)],
        );
        assert_eq!(msg.str_arg(0).unwrap(), "default");
        assert_eq!(msg.i32_arg(1).unwrap(), 54324);
        assert_eq!(msg.port_arg(1).unwrap(), 54324);
        assert_eq!(msg.f32_arg(1).unwrap(), 54324.0);
        assert_eq!(msg.f32_arg(2).unwrap(), 1.5);
        assert!(matches!(msg.i32_arg(0), Err(AppError::MalformedMessage(_))));
        assert!(matches!(msg.str_arg(7), Err(AppError::MalformedMessage(_))));
    }

    #[test]
    fn test_port_out_of_range() {
        let msg = OscMessage::new("/x", vec![OscArg::Int(70000)]);
        assert!(msg.port_arg(0).is_err());
    }

    #[test]
    fn test_flatten_nested_bundles() {
        let a = OscMessage::new("/a", vec![]);
        let b = OscMessage::new("/b", vec![]);
        let c = OscMessage::new("/c", vec![]);
        let packet = OscPacket::Bundle(vec![
            a.clone().into(),
            OscPacket::Bundle(vec![b.clone().into()]),
            c.clone().into(),
        ]);
        assert_eq!(packet.into_messages(), vec![a, b, c]);
    }

    #[test]
    fn test_macro_and_display() {
        let msg = crate::osc_msg!("/SPIN/s/n", "setParam", "width", 640);
        assert_eq!(msg.type_tags(), ",ssi");
        assert_eq!(msg.to_string(), "/SPIN/s/n ,ssi s:setParam s:width i:640");
    }
}
