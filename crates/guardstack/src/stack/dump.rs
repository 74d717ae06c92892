use super::ProtectedStack;
use crate::hardening::self_check::IntegrityReport;
use core::fmt;

/// Diagnostic rendering of a stack. Live slots are marked with `*`; 4-byte
/// elements also show their native-endian `i32` value.
pub struct StackDump<'a> {
    stack: &'a ProtectedStack,
    report: IntegrityReport,
}

impl<'a> StackDump<'a> {
    pub(super) fn new(stack: &'a ProtectedStack) -> Self {
        StackDump {
            stack,
            report: stack.audit(),
        }
    }

    pub fn report(&self) -> &IntegrityReport {
        &self.report
    }
}

impl fmt::Display for StackDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.stack;
        write!(f, "ProtectedStack [{:p}]", s as *const ProtectedStack)?;
        match s.origin() {
            Some(o) => writeln!(f, " \"{}\" constructed at {}:{}", o.name, o.file, o.line)?,
            None => writeln!(f)?,
        }

        if !s.is_initialized() {
            return writeln!(f, "\t<not initialized>");
        }

        writeln!(f, "\tcnt\t\t= {}", s.len())?;
        writeln!(f, "\tcapacity\t= {}", s.capacity())?;
        writeln!(f, "\telem_size\t= {}", s.elem_size())?;

        match self.report.checksum_ok {
            Some(true) => writeln!(
                f,
                "\t{}\t\t= {:#x}",
                s.config().checksum.name(),
                self.report.stored_checksum
            )?,
            Some(false) => writeln!(
                f,
                "\t{}\t\t= {:#x}  <<-- INCORRECT (computed {:#x})",
                s.config().checksum.name(),
                self.report.stored_checksum,
                self.report.computed_checksum
            )?,
            None => writeln!(f, "\tchecksum\t= disabled")?,
        }

        writeln!(f, "\tdata [{:p}]", s.arena_ptr().wrapping_add(s.data_offset()))?;

        match s.arena_guards() {
            Some((head, tail)) => {
                let (rh, rt) = s.record_guards();
                let verdict = if self.report.guards_ok() {
                    "ok"
                } else {
                    "<<-- CORRUPTED"
                };
                writeln!(
                    f,
                    "\tcanaries\trecord {:#018x} {:#018x}, buf {:#018x} {:#018x}  {}",
                    rh, rt, head, tail, verdict
                )?;
            }
            None => writeln!(f, "\tcanaries\tdisabled")?,
        }

        for i in 0..s.capacity() {
            let Some(bytes) = s.slot(i) else { break };
            let marker = if i < s.len() { '*' } else { ' ' };
            write!(f, "\t\t{}\t[{}]\t=", marker, i)?;
            for b in bytes {
                write!(f, " {:02x}", b)?;
            }
            if let Ok(word) = <[u8; 4]>::try_from(bytes) {
                write!(f, "\t({})", i32::from_ne_bytes(word))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
