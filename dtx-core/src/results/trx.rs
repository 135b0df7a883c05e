//! Parser for Visual Studio test result (`.trx`) files
//!
//! A trx file keeps outcomes and test definitions apart:
//!
//! ```xml
//! <TestRun>
//!   <Results>
//!     <UnitTestResult testId="..." testName="Test1" outcome="Failed">
//!       <Output><ErrorInfo><Message>..</Message><StackTrace>..</StackTrace></ErrorInfo></Output>
//!     </UnitTestResult>
//!   </Results>
//!   <TestDefinitions>
//!     <UnitTest id="..."><TestMethod className="A.B" name="Test1" /></UnitTest>
//!   </TestDefinitions>
//! </TestRun>
//! ```
//!
//! The two halves are joined on the test id to recover full names.

use std::collections::HashMap;
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::{TestOutcome, TestResult};
use crate::{Error, Result};

/// A result row before it is joined with its definition
#[derive(Debug, Default)]
struct PendingResult {
    test_id: String,
    test_name: String,
    outcome: String,
    message: Option<String>,
    stack_trace: Option<String>,
}

/// Which text element we are inside of, if any
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextTarget {
    Message,
    StackTrace,
}

/// Parse a trx file from disk
pub fn parse_trx_file(path: &Path) -> Result<Vec<TestResult>> {
    let contents = std::fs::read_to_string(path)?;
    parse_trx(&contents)
}

/// Parse trx contents into per-test results
pub fn parse_trx(contents: &str) -> Result<Vec<TestResult>> {
    let mut reader = Reader::from_str(contents);
    reader.trim_text(true);

    let mut pending: Vec<PendingResult> = Vec::new();
    let mut class_names: HashMap<String, String> = HashMap::new();

    let mut current: Option<PendingResult> = None;
    let mut current_definition: Option<String> = None;
    let mut text_target: Option<TextTarget> = None;
    let mut depth = 0usize;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                depth += 1;
                match e.local_name().as_ref() {
                    b"UnitTestResult" => current = Some(read_result(&e)?),
                    b"UnitTest" => current_definition = attribute(&e, b"id")?,
                    b"TestMethod" => record_class(&e, &current_definition, &mut class_names)?,
                    b"Message" if current.is_some() => text_target = Some(TextTarget::Message),
                    b"StackTrace" if current.is_some() => {
                        text_target = Some(TextTarget::StackTrace)
                    }
                    _ => {}
                }
            }
            Event::Empty(e) => match e.local_name().as_ref() {
                b"UnitTestResult" => pending.push(read_result(&e)?),
                b"TestMethod" => record_class(&e, &current_definition, &mut class_names)?,
                _ => {}
            },
            Event::Text(t) => {
                if let (Some(target), Some(result)) = (text_target, current.as_mut()) {
                    let text = t.unescape()?.into_owned();
                    push_text(result, target, &text);
                }
            }
            Event::CData(c) => {
                if let (Some(target), Some(result)) = (text_target, current.as_mut()) {
                    let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                    push_text(result, target, &text);
                }
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                match e.local_name().as_ref() {
                    b"UnitTestResult" => {
                        if let Some(result) = current.take() {
                            pending.push(result);
                        }
                    }
                    b"UnitTest" => current_definition = None,
                    b"Message" | b"StackTrace" => text_target = None,
                    _ => {}
                }
            }
            // A file that is still being written ends with open elements
            Event::Eof if depth > 0 => {
                return Err(Error::Other("Result file ended unexpectedly".to_string()));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(pending
        .into_iter()
        .map(|p| {
            let full_name = full_name(class_names.get(&p.test_id), &p.test_name);
            TestResult {
                full_name,
                outcome: TestOutcome::from_raw(&p.outcome),
                message: p.message,
                stack_trace: p.stack_trace,
            }
        })
        .collect())
}

/// Join a class name and a test name
///
/// Some frameworks already report the fully-qualified name as the test name.
fn full_name(class_name: Option<&String>, test_name: &str) -> String {
    match class_name {
        Some(class) if !class.is_empty() && !test_name.starts_with(class.as_str()) => {
            format!("{}.{}", class, test_name)
        }
        _ => test_name.to_string(),
    }
}

fn read_result(e: &BytesStart<'_>) -> Result<PendingResult> {
    let test_name = attribute(e, b"testName")?
        .ok_or_else(|| Error::Other("UnitTestResult without testName".to_string()))?;
    Ok(PendingResult {
        test_id: attribute(e, b"testId")?.unwrap_or_default(),
        test_name,
        outcome: attribute(e, b"outcome")?.unwrap_or_default(),
        ..Default::default()
    })
}

fn record_class(
    e: &BytesStart<'_>,
    definition: &Option<String>,
    class_names: &mut HashMap<String, String>,
) -> Result<()> {
    if let (Some(id), Some(class)) = (definition, attribute(e, b"className")?) {
        class_names.insert(id.clone(), class);
    }
    Ok(())
}

fn push_text(result: &mut PendingResult, target: TextTarget, text: &str) {
    let slot = match target {
        TextTarget::Message => &mut result.message,
        TextTarget::StackTrace => &mut result.stack_trace,
    };
    slot.get_or_insert_with(String::new).push_str(text);
}

fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.local_name().as_ref() == name {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}
