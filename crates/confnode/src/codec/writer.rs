use std::io::{self, Write};

use crate::options::Options;
use crate::setting::Setting;
use crate::tree::Tree;
use crate::value::{SettingFormat, SettingType, Value};

pub(crate) fn write(tree: &Tree, options: &Options, out: &mut dyn Write) -> io::Result<()> {
    let mut writer = Writer { out, options };
    for member in tree.root().children() {
        writer.member(member, 0)?;
    }
    writer.out.flush()
}

struct Writer<'w, 'o> {
    out: &'w mut dyn Write,
    options: &'o Options,
}

impl Writer<'_, '_> {
    fn indent(&mut self, depth: usize) -> io::Result<()> {
        let width = depth * usize::from(self.options.tab_width);
        write!(self.out, "{:width$}", "")
    }

    /// `name = value;` line for a Group member.
    fn member(&mut self, setting: Setting<'_>, depth: usize) -> io::Result<()> {
        self.indent(depth)?;
        write!(self.out, "{}", setting.name().unwrap_or_default())?;

        if setting.is_group() {
            let assign = if self.options.colon_assignment_for_groups {
                " :"
            } else {
                " ="
            };
            self.out.write_all(assign.as_bytes())?;
            if self.options.open_brace_on_separate_line {
                self.out.write_all(b"\n")?;
                self.indent(depth)?;
            } else {
                self.out.write_all(b" ")?;
            }
        } else {
            let assign = if self.options.colon_assignment_for_non_groups {
                " : "
            } else {
                " = "
            };
            self.out.write_all(assign.as_bytes())?;
        }

        self.value(setting, depth)?;
        if self.options.semicolon_separators {
            self.out.write_all(b";")?;
        }
        self.out.write_all(b"\n")
    }

    fn value(&mut self, setting: Setting<'_>, depth: usize) -> io::Result<()> {
        match setting.setting_type() {
            SettingType::Group => {
                if setting.is_empty() {
                    return self.out.write_all(b"{ }");
                }
                self.out.write_all(b"{\n")?;
                for member in setting.children() {
                    self.member(member, depth + 1)?;
                }
                self.indent(depth)?;
                self.out.write_all(b"}")
            }
            SettingType::Array => self.sequence(setting, depth, "[", "]"),
            SettingType::List => self.sequence(setting, depth, "(", ")"),
            _ => match setting.value() {
                Some(value) => self.scalar(value, setting.format()),
                None => Ok(()),
            },
        }
    }

    fn sequence(
        &mut self,
        setting: Setting<'_>,
        depth: usize,
        open: &str,
        close: &str,
    ) -> io::Result<()> {
        if setting.is_empty() {
            return write!(self.out, "{open} {close}");
        }
        write!(self.out, "{open} ")?;
        for (i, element) in setting.children().enumerate() {
            if i > 0 {
                self.out.write_all(b", ")?;
            }
            self.value(element, depth)?;
        }
        write!(self.out, " {close}")
    }

    fn scalar(&mut self, value: &Value, format: SettingFormat) -> io::Result<()> {
        match value {
            Value::Int(i) if format == SettingFormat::Hex => write!(self.out, "0x{:X}", *i as u64),
            Value::Int(i) => write!(self.out, "{i}"),
            Value::Float(f) => self.out.write_all(format_float(*f).as_bytes()),
            Value::Bool(b) => write!(self.out, "{b}"),
            Value::String(s) => self.out.write_all(quote(s).as_bytes()),
        }
    }
}

/// Shortest text that parses back to the same float, always recognisable as
/// a float (it contains `.`, an exponent, or is `nan`/`inf`).
fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "nan".into();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf".into() } else { "-inf".into() };
    }
    let text = format!("{f:?}");
    if text.contains(['.', 'e', 'E']) {
        text
    } else {
        format!("{text}.0")
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{c}' => out.push_str("\\f"),
            c if c.is_ascii_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
