//! Built-in Language Server Configurations

use crate::models::server::{LanguageServerConfig, ServerStartInfo};

fn server(id: &str, name: &str, command: &str, args: &[&str]) -> LanguageServerConfig {
    LanguageServerConfig::new(
        id,
        name,
        ServerStartInfo::new(command).with_args(args.iter().copied()),
    )
}

/// Servers registered with every manager, in lookup order
pub fn defaults() -> Vec<LanguageServerConfig> {
    vec![
        server("pylsp", "Python LSP Server", "pylsp", &[])
            .with_description("Python language server (python-lsp-server)")
            .with_languages(["python"])
            .with_extensions([".py", ".pyi"]),
        server(
            "typescript",
            "TypeScript Language Server",
            "typescript-language-server",
            &["--stdio"],
        )
        .with_description("TypeScript and JavaScript via tsserver")
        .with_languages([
            "typescript",
            "typescriptreact",
            "javascript",
            "javascriptreact",
        ])
        .with_extensions([".ts", ".tsx", ".js", ".jsx", ".mjs", ".cjs"]),
        server("omnisharp", "OmniSharp", "OmniSharp", &["-lsp"])
            .with_description("C# language server")
            .with_languages(["csharp"])
            .with_extensions([".cs", ".csx"]),
        server("rust-analyzer", "rust-analyzer", "rust-analyzer", &[])
            .with_languages(["rust"])
            .with_extensions([".rs"]),
        server("gopls", "gopls", "gopls", &[])
            .with_description("Official Go language server")
            .with_languages(["go"])
            .with_extensions([".go"]),
        server(
            "clangd",
            "clangd",
            "clangd",
            &["--background-index", "--clang-tidy"],
        )
        .with_languages(["c", "cpp"])
        .with_extensions([".c", ".h", ".cc", ".cpp", ".cxx", ".hh", ".hpp", ".hxx"]),
        server(
            "json",
            "VS Code JSON Language Server",
            "vscode-json-language-server",
            &["--stdio"],
        )
        .with_languages(["json", "jsonc"])
        .with_extensions([".json", ".jsonc"]),
        server(
            "html",
            "VS Code HTML Language Server",
            "vscode-html-language-server",
            &["--stdio"],
        )
        .with_languages(["html"])
        .with_extensions([".html", ".htm"]),
        server(
            "css",
            "VS Code CSS Language Server",
            "vscode-css-language-server",
            &["--stdio"],
        )
        .with_languages(["css", "scss", "less"])
        .with_extensions([".css", ".scss", ".less"]),
        server(
            "yaml",
            "YAML Language Server",
            "yaml-language-server",
            &["--stdio"],
        )
        .with_languages(["yaml"])
        .with_extensions([".yaml", ".yml"]),
        server("lua", "Lua Language Server", "lua-language-server", &[])
            .with_languages(["lua"])
            .with_extensions([".lua"]),
    ]
}

/// How to get a built-in server onto `PATH`
pub fn install_hint(id: &str) -> Option<&'static str> {
    Some(match id {
        "pylsp" => "pip install python-lsp-server",
        "typescript" => "npm install -g typescript-language-server typescript",
        "omnisharp" => "Download from https://github.com/OmniSharp/omnisharp-roslyn/releases",
        "rust-analyzer" => "rustup component add rust-analyzer",
        "gopls" => "go install golang.org/x/tools/gopls@latest",
        "clangd" => "Install clangd from your LLVM distribution",
        "json" | "html" | "css" => "npm install -g vscode-langservers-extracted",
        "yaml" => "npm install -g yaml-language-server",
        "lua" => "Download from https://github.com/LuaLS/lua-language-server/releases",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_defaults_are_valid_and_unique() {
        let configs = defaults();
        let ids: HashSet<_> = configs.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids.len(), configs.len());

        for config in &configs {
            config.validate().unwrap();
            assert!(config.enabled);
            assert!(install_hint(&config.id).is_some(), "{}", config.id);
        }
    }

    #[test]
    fn test_extensions_map_to_expected_servers() {
        let configs = defaults();
        let find = |ext: &str| {
            configs
                .iter()
                .find(|c| c.handles_extension(ext))
                .map(|c| c.id.as_str())
        };

        assert_eq!(find(".py"), Some("pylsp"));
        assert_eq!(find(".tsx"), Some("typescript"));
        assert_eq!(find(".cs"), Some("omnisharp"));
        assert_eq!(find(".rs"), Some("rust-analyzer"));
        assert_eq!(find(".go"), Some("gopls"));
        assert_eq!(find(".hpp"), Some("clangd"));
        assert_eq!(find(".yml"), Some("yaml"));
        assert_eq!(find(".bas"), None);
    }

    #[test]
    fn test_stdio_flags() {
        let configs = defaults();
        let ts = configs.iter().find(|c| c.id == "typescript").unwrap();
        assert_eq!(ts.start.args, ["--stdio"]);
        let omnisharp = configs.iter().find(|c| c.id == "omnisharp").unwrap();
        assert_eq!(omnisharp.start.command, "OmniSharp");
    }
}
