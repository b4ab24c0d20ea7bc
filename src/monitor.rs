use std::io;
use std::path::Path;
use std::process::{Child, Command, Stdio};

pub const DEFAULT_PORT: u16 = 6006;

/// Manages a TensorBoard child process pointed at a run directory tree.
///
/// Only one instance is kept per monitor; launching again replaces the
/// previous process.
pub struct TensorboardMonitor {
    port: u16,
    child: Option<Child>,
}

impl TensorboardMonitor {
    pub fn new(port: u16) -> Self {
        TensorboardMonitor { port, child: None }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Kill any stray TensorBoard instance, then start a fresh one serving
    /// `logdir` on this monitor's port.
    pub fn launch(&mut self, logdir: &Path) -> io::Result<()> {
        self.stop();
        // Stray instances from earlier runs hold the port
        let _ = Command::new("pkill")
            .args(["-f", "tensorboard"])
            .status();
        let child = Command::new("tensorboard")
            .arg("--logdir")
            .arg(logdir)
            .arg("--port")
            .arg(self.port.to_string())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        self.child = Some(child);
        println!("TensorBoard serving on http://localhost:{}", self.port);
        Ok(())
    }

    /// Open the dashboard in the default browser.
    pub fn open_browser(&self) -> io::Result<()> {
        let url = format!("http://localhost:{}", self.port);
        #[cfg(target_os = "macos")]
        let opener = "open";
        #[cfg(not(target_os = "macos"))]
        let opener = "xdg-open";
        Command::new(opener).arg(url).spawn()?;
        Ok(())
    }

    /// Terminate the managed process, if any.
    pub fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Default for TensorboardMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_PORT)
    }
}

impl Drop for TensorboardMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_port() {
        let monitor = TensorboardMonitor::default();
        assert_eq!(monitor.port(), DEFAULT_PORT);
    }

    #[test]
    fn test_stop_without_launch_is_noop() {
        let mut monitor = TensorboardMonitor::new(7007);
        monitor.stop();
        monitor.stop();
    }
}
