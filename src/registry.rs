//! Body name → body index mapping built from the 6D parameter document.
//!
//! Index order is declaration order in the parameter XML, which the server
//! guarantees to be the order of bodies in every 6D data component.

use std::collections::HashMap;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{BridgeError, Result};

/// Position of a body within a frame's body list. Valid for one session only.
pub type BodyIndex = usize;

/// Write-once registry of tracked bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyRegistry {
    names: Vec<String>,
    index: HashMap<String, BodyIndex>,
}

impl BodyRegistry {
    /// Builds the registry from body names in declaration order.
    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let mut index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            if name.is_empty() {
                return Err(BridgeError::InvalidBodyDeclaration(format!(
                    "body {} has an empty name",
                    i
                )));
            }
            if index.insert(name.clone(), i).is_some() {
                return Err(BridgeError::InvalidBodyDeclaration(format!(
                    "body name '{}' declared twice",
                    name
                )));
            }
        }
        Ok(Self { names, index })
    }

    /// Parses a `GetParameters 6D` reply.
    ///
    /// Every `<Body>` directly under `<The_6D>` contributes its trimmed
    /// `<Name>` text. A `<Bodies>` count that disagrees with the number of
    /// `<Body>` elements is a `ConfigurationMismatch`.
    pub fn from_parameters(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut path: Vec<Vec<u8>> = Vec::new();
        let mut names: Vec<String> = Vec::new();
        let mut declared: Option<usize> = None;
        let mut in_body_name = false;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let tag = e.name().as_ref().to_vec();
                    let parent = path.last().map(Vec::as_slice);
                    let grandparent = path.len().checked_sub(2).map(|i| path[i].as_slice());
                    match (tag.as_slice(), parent, grandparent) {
                        (b"Body", Some(b"The_6D"), _) => names.push(String::new()),
                        (b"Name", Some(b"Body"), Some(b"The_6D")) => in_body_name = true,
                        _ => {}
                    }
                    path.push(tag);
                }
                Ok(Event::Empty(e)) => {
                    let parent = path.last().map(Vec::as_slice);
                    if e.name().as_ref() == b"Body" && parent == Some(b"The_6D".as_slice()) {
                        names.push(String::new());
                    }
                }
                Ok(Event::Text(t)) => {
                    let text = t
                        .unescape()
                        .map_err(|e| BridgeError::protocol(format!("6D parameters: {}", e)))?;
                    if in_body_name {
                        if let Some(last) = names.last_mut() {
                            last.push_str(text.trim());
                        }
                    } else if path.last().map(Vec::as_slice) == Some(b"Bodies".as_slice()) {
                        let n = text.trim().parse::<usize>().map_err(|_| {
                            BridgeError::protocol(format!("bad <Bodies> count '{}'", text))
                        })?;
                        declared = Some(n);
                    }
                }
                Ok(Event::End(_)) => {
                    in_body_name = false;
                    path.pop();
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(BridgeError::protocol(format!("6D parameters: {}", e))),
            }
        }

        if let Some(declared) = declared {
            if declared != names.len() {
                return Err(BridgeError::configuration_mismatch(declared, names.len()));
            }
        }

        Self::from_names(names)
    }

    /// Index of `name`, or `BodyNotFound`. Never substitutes another body.
    pub fn lookup(&self, name: &str) -> Result<BodyIndex> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| BridgeError::body_not_found(name))
    }

    pub fn name_of(&self, index: BodyIndex) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    /// Body names in index order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Fails fast when a frame reports a different number of bodies.
    pub fn ensure_body_count(&self, reported: usize) -> Result<()> {
        if reported != self.names.len() {
            return Err(BridgeError::configuration_mismatch(self.names.len(), reported));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_DRONES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<QTM_Parameters_Ver_1.25>
    <The_6D>
        <Bodies>2</Bodies>
        <Body>
            <Name>Drone1</Name>
            <Color R="255" G="0" B="0"/>
            <Points>
                <Point X="0.0" Y="0.0" Z="0.0" Virtual="0" PhysicalId="0" Name="p0"/>
            </Points>
            <Data_orientation Relative_body="0">GlobalOrientation</Data_orientation>
        </Body>
        <Body>
            <Name> Drone2 </Name>
        </Body>
        <Euler>
            <First>Roll</First>
            <Name>ignored</Name>
        </Euler>
    </The_6D>
</QTM_Parameters_Ver_1.25>"#;

    #[test]
    fn test_lookup_by_declaration_order() {
        let registry = BodyRegistry::from_parameters(TWO_DRONES).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.lookup("Drone1").unwrap(), 0);
        assert_eq!(registry.lookup("Drone2").unwrap(), 1);
    }

    #[test]
    fn test_lookup_missing_body() {
        let registry = BodyRegistry::from_parameters(TWO_DRONES).unwrap();
        let err = registry.lookup("Ghost").unwrap_err();
        assert!(matches!(err, BridgeError::BodyNotFound(ref n) if n == "Ghost"));
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        let registry = BodyRegistry::from_parameters(TWO_DRONES).unwrap();
        assert!(registry.lookup("drone1").is_err());
    }

    #[test]
    fn test_names_in_index_order() {
        let registry = BodyRegistry::from_parameters(TWO_DRONES).unwrap();
        let names: Vec<&str> = registry.names().collect();
        assert_eq!(names, vec!["Drone1", "Drone2"]);
        assert_eq!(registry.name_of(1), Some("Drone2"));
        assert_eq!(registry.name_of(2), None);
    }

    #[test]
    fn test_bare_6d_document() {
        let xml = "<The_6D><Body><Name>L-frame</Name></Body></The_6D>";
        let registry = BodyRegistry::from_parameters(xml).unwrap();
        assert_eq!(registry.lookup("L-frame").unwrap(), 0);
    }

    #[test]
    fn test_declared_count_mismatch() {
        let xml = "<P><The_6D><Bodies>3</Bodies><Body><Name>A</Name></Body></The_6D></P>";
        let err = BodyRegistry::from_parameters(xml).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::ConfigurationMismatch { declared: 3, reported: 1 }
        ));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let xml = "<P><The_6D><Body><Name>A</Name></Body><Body><Name>A</Name></Body></The_6D></P>";
        assert!(matches!(
            BodyRegistry::from_parameters(xml),
            Err(BridgeError::InvalidBodyDeclaration(_))
        ));
    }

    #[test]
    fn test_no_bodies() {
        let xml = "<P><The_6D><Bodies>0</Bodies></The_6D></P>";
        let registry = BodyRegistry::from_parameters(xml).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_malformed_xml() {
        let xml = "<P><The_6D><Body><Name>A</Body></The_6D></P>";
        assert!(BodyRegistry::from_parameters(xml).is_err());
    }

    #[test]
    fn test_ensure_body_count() {
        let registry = BodyRegistry::from_names(["A", "B"]).unwrap();
        assert!(registry.ensure_body_count(2).is_ok());
        assert!(matches!(
            registry.ensure_body_count(3),
            Err(BridgeError::ConfigurationMismatch { declared: 2, reported: 3 })
        ));
    }
}
