//! Default system prompt.

use std::path::Path;

const ASSISTANT_PERSONA: &str = "\
You are a capable assistant working inside the user's terminal. Tools from \
connected MCP servers let you read and change things on the user's machine.

<tool_use>
1. Call a tool only when the answer needs it; answer directly when you already know.
2. Follow each tool's parameter schema exactly and supply every required argument.
3. Only call tools that are offered in this request, even if earlier messages mention others.
4. Say briefly what you are about to do before calling a tool, without naming the tool itself.
5. If a tool reports an error or a timeout, explain it or try another approach instead of repeating the same call.
6. If a required argument cannot be inferred, ask the user for it.
</tool_use>

<communication>
Answer in markdown. Use backticks for file, directory and command names. \
Never invent results you did not observe.
</communication>";

/// Facts about the machine the assistant is running on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub os: String,
    pub workspace: String,
    pub shell: String,
}

impl UserInfo {
    /// Read the OS, current directory and `$SHELL` of this process.
    pub fn detect() -> Self {
        let workspace = std::env::current_dir()
            .map(|dir| dir.display().to_string())
            .unwrap_or_else(|_| ".".to_string());
        Self::new(
            std::env::consts::OS,
            Path::new(&workspace),
            std::env::var("SHELL").ok().as_deref(),
        )
    }

    pub fn new(os: &str, workspace: &Path, shell: Option<&str>) -> Self {
        Self {
            os: format!("{os} ({})", std::env::consts::ARCH),
            workspace: workspace.display().to_string(),
            shell: shell
                .filter(|s| !s.is_empty())
                .unwrap_or("unknown")
                .to_string(),
        }
    }
}

/// The assistant persona followed by a `<user_info>` block.
pub fn render_system_prompt(info: &UserInfo) -> String {
    format!(
        "{ASSISTANT_PERSONA}\n\n<user_info>\nThe user's OS is {}. The absolute path of the \
         user's workspace is {}. The user's shell is {}.\n</user_info>",
        info.os, info.workspace, info.shell
    )
}

pub fn default_system_prompt() -> String {
    render_system_prompt(&UserInfo::detect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_info_block_is_filled_in() {
        let info = UserInfo::new("linux", Path::new("/home/ada/project"), Some("/bin/zsh"));
        let prompt = render_system_prompt(&info);

        assert!(prompt.starts_with(ASSISTANT_PERSONA));
        assert!(prompt.contains("<tool_use>"));
        assert!(prompt.contains("The user's OS is linux ("));
        assert!(prompt.contains("workspace is /home/ada/project."));
        assert!(prompt.ends_with("The user's shell is /bin/zsh.\n</user_info>"));
    }

    #[test]
    fn missing_shell_is_unknown() {
        let info = UserInfo::new("macos", Path::new("/tmp"), None);
        assert_eq!(info.shell, "unknown");
        let info = UserInfo::new("macos", Path::new("/tmp"), Some(""));
        assert_eq!(info.shell, "unknown");
    }

    #[test]
    fn detect_uses_this_process() {
        let info = UserInfo::detect();
        assert!(info.os.starts_with(std::env::consts::OS));
        assert!(!info.workspace.is_empty());
    }
}
