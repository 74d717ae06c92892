use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Turns raw instruction bytes into readable text for the crash report.
///
/// Renderers run inside the crash handler after the raw byte dump, so they
/// may allocate or spawn processes; any error they return is printed as a
/// single line and the report continues.
pub trait InstructionRenderer: Send + Sync {
    fn render(&self, address: usize, bytes: &[u8]) -> io::Result<String>;
}

/// Pipes the bytes through the `ndisasm` binary.
#[derive(Debug, Clone)]
pub struct NdisasmRenderer {
    program: PathBuf,
    bits: u8,
}

impl Default for NdisasmRenderer {
    fn default() -> Self {
        NdisasmRenderer {
            program: PathBuf::from("ndisasm"),
            bits: 64,
        }
    }
}

impl NdisasmRenderer {
    pub fn new(program: impl Into<PathBuf>, bits: u8) -> Self {
        NdisasmRenderer {
            program: program.into(),
            bits,
        }
    }
}

impl InstructionRenderer for NdisasmRenderer {
    fn render(&self, address: usize, bytes: &[u8]) -> io::Result<String> {
        let mut child = Command::new(&self.program)
            .arg("-b")
            .arg(self.bits.to_string())
            .arg("-o")
            .arg(format!("{:#x}", address))
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(bytes)?;
        }
        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(io::Error::other(format!(
                "{} exited with {}",
                self.program.display(),
                output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_program_is_an_error() {
        let r = NdisasmRenderer::new("/nonexistent/guardstack-ndisasm", 64);
        assert!(r.render(0x1000, &[0x90, 0xc3]).is_err());
    }

    #[test]
    fn failing_program_is_an_error() {
        let r = NdisasmRenderer::new("false", 64);
        // `false` ignores its arguments and exits 1
        assert!(r.render(0, &[0x90]).is_err());
    }
}
