//! Code Analysis - imports, API endpoints and node dependencies per repository
//!
//! Line-oriented scanning, no Python parser:
//! - `import a.b, c as d` and `from a.b import x` give top-level names
//! - `@<obj>.get("/path")` style decorators give `"GET /path (file)"`
//! - a `FastAPI(` call outside a decorator gives `"FastAPI instance (file)"`
//! - `package.json` dependencies and devDependencies are merged
//!
//! Unreadable or non-UTF-8 files are skipped silently.

use crate::types::{CodeSummary, RepositoryRecord};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;
use walkdir::WalkDir;

/// Python files inspected per repository
pub const MAX_PYTHON_FILES: usize = 500;

const HTTP_METHODS: &[&str] = &["get", "post", "put", "delete", "patch"];

/// Standard-library top-level modules that never count as dependencies
/// (CPython `sys.stdlib_module_names`, lower-cased)
const PYTHON_STDLIB: &[&str] = &[
    "__future__", "_abc", "_aix_support", "_ast", "_asyncio", "_bisect", "_blake2",
    "_bootsubprocess", "_bz2", "_codecs", "_codecs_cn", "_codecs_hk", "_codecs_iso2022",
    "_codecs_jp", "_codecs_kr", "_codecs_tw", "_collections", "_collections_abc",
    "_compat_pickle", "_compression", "_contextvars", "_crypt", "_csv", "_ctypes", "_curses",
    "_curses_panel", "_datetime", "_dbm", "_decimal", "_elementtree", "_frozen_importlib",
    "_frozen_importlib_external", "_functools", "_gdbm", "_hashlib", "_heapq", "_imp", "_io",
    "_json", "_locale", "_lsprof", "_lzma", "_markupbase", "_md5", "_msi", "_multibytecodec",
    "_multiprocessing", "_opcode", "_operator", "_osx_support", "_overlapped", "_pickle",
    "_posixshmem", "_posixsubprocess", "_py_abc", "_pydecimal", "_pyio", "_queue", "_random",
    "_scproxy", "_sha1", "_sha256", "_sha3", "_sha512", "_signal", "_sitebuiltins", "_socket",
    "_sqlite3", "_sre", "_ssl", "_stat", "_statistics", "_string", "_strptime", "_struct",
    "_symtable", "_thread", "_threading_local", "_tkinter", "_tokenize", "_tracemalloc",
    "_typing", "_uuid", "_warnings", "_weakref", "_weakrefset", "_winapi", "_zoneinfo", "abc",
    "aifc", "antigravity", "argparse", "array", "ast", "asynchat", "asyncio", "asyncore",
    "atexit", "audioop", "base64", "bdb", "binascii", "bisect", "builtins", "bz2", "calendar",
    "cgi", "cgitb", "chunk", "cmath", "cmd", "code", "codecs", "codeop", "collections",
    "colorsys", "compileall", "concurrent", "configparser", "contextlib", "contextvars", "copy",
    "copyreg", "cprofile", "crypt", "csv", "ctypes", "curses", "dataclasses", "datetime", "dbm",
    "decimal", "difflib", "dis", "distutils", "doctest", "email", "encodings", "ensurepip",
    "enum", "errno", "faulthandler", "fcntl", "filecmp", "fileinput", "fnmatch", "fractions",
    "ftplib", "functools", "gc", "genericpath", "getopt", "getpass", "gettext", "glob",
    "graphlib", "grp", "gzip", "hashlib", "heapq", "hmac", "html", "http", "idlelib", "imaplib",
    "imghdr", "imp", "importlib", "inspect", "io", "ipaddress", "itertools", "json", "keyword",
    "lib2to3", "linecache", "locale", "logging", "lzma", "mailbox", "mailcap", "marshal",
    "math", "mimetypes", "mmap", "modulefinder", "msilib", "msvcrt", "multiprocessing", "netrc",
    "nis", "nntplib", "nt", "ntpath", "nturl2path", "numbers", "opcode", "operator", "optparse",
    "os", "ossaudiodev", "pathlib", "pdb", "pickle", "pickletools", "pipes", "pkgutil",
    "platform", "plistlib", "poplib", "posix", "posixpath", "pprint", "profile", "pstats",
    "pty", "pwd", "py_compile", "pyclbr", "pydoc", "pydoc_data", "pyexpat", "queue", "quopri",
    "random", "re", "readline", "reprlib", "resource", "rlcompleter", "runpy", "sched",
    "secrets", "select", "selectors", "shelve", "shlex", "shutil", "signal", "site", "smtpd",
    "smtplib", "sndhdr", "socket", "socketserver", "spwd", "sqlite3", "sre_compile",
    "sre_constants", "sre_parse", "ssl", "stat", "statistics", "string", "stringprep", "struct",
    "subprocess", "sunau", "symtable", "sys", "sysconfig", "syslog", "tabnanny", "tarfile",
    "telnetlib", "tempfile", "termios", "textwrap", "this", "threading", "time", "timeit",
    "tkinter", "token", "tokenize", "tomllib", "trace", "traceback", "tracemalloc", "tty",
    "turtle", "turtledemo", "types", "typing", "typing_extensions", "unicodedata", "unittest",
    "urllib", "uu", "uuid", "venv", "warnings", "wave", "weakref", "webbrowser", "winreg",
    "winsound", "wsgiref", "xdrlib", "xml", "xmlrpc", "zipapp", "zipfile", "zipimport", "zlib",
    "zoneinfo",
];

fn import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*import\s+(.+?)\s*(?:#.*)?$").expect("valid regex"))
}

fn from_import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*from\s+([A-Za-z_][\w.]*)\s+import\b").expect("valid regex")
    })
}

fn route_decorator_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^\s*@[A-Za-z_][\w.]*\.([A-Za-z]+)\(\s*["']([^"']*)["']"#).expect("valid regex")
    })
}

fn is_stdlib(module: &str) -> bool {
    PYTHON_STDLIB.binary_search(&module).is_ok()
}

/// Lower-cased top-level package for a dotted module path
fn top_level(module: &str) -> Option<String> {
    let head = module.split('.').next()?.trim();
    if head.is_empty() || !head.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }
    Some(head.to_lowercase())
}

/// Third-party and first-party top-level imports found in one source text
///
/// Relative imports (`from . import x`, `from .pkg import y`) are skipped.
pub fn extract_imports(source: &str) -> Vec<String> {
    let mut modules = Vec::new();

    for line in source.lines() {
        if let Some(caps) = from_import_re().captures(line) {
            if let Some(name) = top_level(&caps[1]) {
                modules.push(name);
            }
        } else if let Some(caps) = import_re().captures(line) {
            for part in caps[1].split(',') {
                let module = part.split_whitespace().next().unwrap_or("");
                if let Some(name) = top_level(module) {
                    modules.push(name);
                }
            }
        }
    }

    modules.retain(|m| !is_stdlib(m));
    modules
}

/// Route decorators and FastAPI app instantiation in one source file
pub fn extract_endpoints(source: &str, file_label: &str) -> Vec<String> {
    let mut endpoints = Vec::new();

    for line in source.lines() {
        if let Some(caps) = route_decorator_re().captures(line) {
            let method = caps[1].to_lowercase();
            if HTTP_METHODS.contains(&method.as_str()) {
                endpoints.push(format!("{} {} ({})", method.to_uppercase(), &caps[2], file_label));
            }
        }
    }

    if source.contains("FastAPI") {
        let instantiated = source
            .lines()
            .map(str::trim)
            .filter(|l| !l.starts_with('@'))
            .any(|l| l.contains("FastAPI("));
        if instantiated {
            endpoints.push(format!("FastAPI instance ({})", file_label));
        }
    }

    endpoints
}

#[derive(Debug, Default, Deserialize)]
struct PackageJson {
    #[serde(default)]
    dependencies: BTreeMap<String, serde_json::Value>,
    #[serde(default, rename = "devDependencies")]
    dev_dependencies: BTreeMap<String, serde_json::Value>,
}

/// `dependencies` merged with `devDependencies` (dev wins on conflict)
pub fn parse_package_json(text: &str) -> BTreeMap<String, String> {
    let package: PackageJson = match serde_json::from_str(text) {
        Ok(p) => p,
        Err(e) => {
            debug!("Ignoring unparseable package.json: {}", e);
            return BTreeMap::new();
        }
    };

    package
        .dependencies
        .into_iter()
        .chain(package.dev_dependencies)
        .map(|(name, version)| {
            let version = match version {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (name, version)
        })
        .collect()
}

/// Python files under a repository, in stable order, capped
fn python_files(repo: &Path) -> Vec<PathBuf> {
    WalkDir::new(repo)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !(e.file_type().is_dir() && crate::repos::is_skipped(e.path())))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().map(|x| x == "py").unwrap_or(false))
        .take(MAX_PYTHON_FILES)
        .map(|e| e.into_path())
        .collect()
}

/// Summarize one repository
pub fn analyze_repository(repo: &Path) -> CodeSummary {
    let mut summary = CodeSummary::new(repo);

    for file in python_files(repo) {
        let source = match fs::read_to_string(&file) {
            Ok(s) => s,
            Err(_) => continue,
        };
        let label = file.strip_prefix(repo).unwrap_or(&file).display().to_string();

        summary.imported_module_names.extend(extract_imports(&source));
        summary.api_endpoint_descriptors.extend(extract_endpoints(&source, &label));
    }

    if let Ok(text) = fs::read_to_string(repo.join("package.json")) {
        summary.declared_node_dependencies = parse_package_json(&text);
    }

    debug!(
        "{}: {} import(s), {} endpoint(s), {} node dep(s)",
        repo.display(),
        summary.imported_module_names.len(),
        summary.api_endpoint_descriptors.len(),
        summary.declared_node_dependencies.len()
    );
    summary
}

/// Summarize every repository that still exists on disk
pub fn analyze_codebases(repositories: &[RepositoryRecord]) -> Vec<CodeSummary> {
    repositories
        .iter()
        .filter(|r| r.path.is_dir())
        .map(|r| analyze_repository(&r.path))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const APP_PY: &str = r#"
import os, sys
import darwin_core.models as models
import requests  # http client
from fastapi import FastAPI, APIRouter
from . import local
from .sibling import thing
from Pydantic.main import BaseModel
from typing import List

app = FastAPI(title="api")
router = APIRouter()

@app.get("/health")
def health():
    return {"ok": True}

@router.post('/items')
def create():
    pass

@app.middleware("http")
async def mw(request, call_next):
    pass
"#;

    #[test]
    fn test_stdlib_list_sorted() {
        let mut sorted = PYTHON_STDLIB.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, PYTHON_STDLIB);
    }

    #[test]
    fn test_extract_imports() {
        let mut imports = extract_imports(APP_PY);
        imports.sort();
        imports.dedup();
        assert_eq!(imports, vec!["darwin_core", "fastapi", "pydantic", "requests"]);
    }

    #[test]
    fn test_less_common_stdlib_modules_filtered() {
        let src = "import atexit, getopt, pdb\nimport optparse\nfrom xmlrpc.client import ServerProxy\n\
                   from wsgiref.simple_server import make_server\nimport smtplib, tokenize, fileinput\n\
                   import copyreg\nimport site\nimport darwin_core\n";
        assert_eq!(extract_imports(src), vec!["darwin_core"]);
    }

    #[test]
    fn test_extract_endpoints() {
        let endpoints = extract_endpoints(APP_PY, "app/main.py");
        assert_eq!(
            endpoints,
            vec![
                "GET /health (app/main.py)",
                "POST /items (app/main.py)",
                "FastAPI instance (app/main.py)",
            ]
        );
    }

    #[test]
    fn test_fastapi_only_in_decorator_not_instance() {
        let src = "from fastapi import FastAPI\n@depends(FastAPI())\ndef f(): pass\n";
        assert!(extract_endpoints(src, "x.py").is_empty());
    }

    #[test]
    fn test_package_json_merge() {
        let deps = parse_package_json(
            r#"{"dependencies": {"react": "^18.2.0", "shared": "1.0.0"},
                "devDependencies": {"vite": "^5.0.0", "shared": "2.0.0"}}"#,
        );
        assert_eq!(deps.len(), 3);
        assert_eq!(deps["react"], "^18.2.0");
        assert_eq!(deps["shared"], "2.0.0");
        assert!(parse_package_json("{not json").is_empty());
    }

    #[test]
    fn test_analyze_repository_tree() {
        let dir = TempDir::new().unwrap();
        let repo = dir.path().join("darwin-api");
        fs::create_dir_all(repo.join("app")).unwrap();
        fs::create_dir_all(repo.join(".venv/lib")).unwrap();
        fs::write(repo.join("app/main.py"), APP_PY).unwrap();
        fs::write(repo.join(".venv/lib/site.py"), "import hiddenpkg\n").unwrap();
        fs::write(repo.join("app/bad.py"), [0xffu8, 0xfe, 0x00]).unwrap();
        fs::write(repo.join("package.json"), r#"{"dependencies": {"axios": "1.6.0"}}"#).unwrap();

        let summary = analyze_repository(&repo);
        assert_eq!(summary.repository_name(), "darwin-api");
        assert!(summary.imported_module_names.contains("darwin_core"));
        assert!(!summary.imported_module_names.contains("hiddenpkg"));
        assert!(!summary.imported_module_names.contains("os"));
        assert_eq!(summary.api_endpoint_descriptors.len(), 3);
        assert_eq!(summary.declared_node_dependencies["axios"], "1.6.0");
    }
}
