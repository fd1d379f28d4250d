//! Generator for the pytest hook module that records evidence.
//!
//! The generated `conftest.py` gives every test a page that records video
//! into one directory per session, logs each page action to a session log,
//! and writes a JSON report when the session finishes.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::RunnerResult;

/// Strings an existing `conftest.py` must contain to be reused as-is.
pub const MARKERS: [&str; 3] = ["record_video_dir", "EVIDENCE_DIR", "PlaywrightLogger"];

const EVIDENCE_PLACEHOLDER: &str = "__EVIDENCE_DIR__";

const TEMPLATE: &str = r#""""
Evidence hooks for generated Playwright tests.
All tests in a session share one log file and one video directory.
"""
import json
import logging
import os
import time
from datetime import datetime
from pathlib import Path

import pytest
from playwright.sync_api import sync_playwright

EVIDENCE_DIR = Path(r"__EVIDENCE_DIR__")
HEADLESS_MODE = os.environ.get("PLAYWRIGHT_HEADLESS", "true").lower() == "true"

SESSION_TIMESTAMP = datetime.now().strftime("%Y%m%d_%H%M%S")
SESSION_VIDEO_DIR = EVIDENCE_DIR / SESSION_TIMESTAMP
SESSION_LOG_FILE = EVIDENCE_DIR / f"test_execution_{SESSION_TIMESTAMP}.log"
SESSION_REPORT_FILE = EVIDENCE_DIR / f"report_{SESSION_TIMESTAMP}.json"
SESSION_TEST_RESULTS = []
SESSION_START_TIME = datetime.now()

SESSION_VIDEO_DIR.mkdir(parents=True, exist_ok=True)

logger = logging.getLogger("playwright_test")
logger.setLevel(logging.DEBUG)
_file_handler = logging.FileHandler(SESSION_LOG_FILE, mode="w", encoding="utf-8")
_file_handler.setFormatter(
    logging.Formatter("%(asctime)s [%(levelname)s] %(message)s", datefmt="%Y-%m-%d %H:%M:%S")
)
logger.addHandler(_file_handler)
logger.info("========== TEST SESSION STARTED ==========")
logger.info(f"Video directory: {SESSION_VIDEO_DIR}")


class PlaywrightLogger:
    """Wraps a page and logs each action as a numbered step."""

    LOGGED = {
        "goto": "NAVIGATE",
        "click": "CLICK",
        "fill": "FILL",
        "type": "TYPE",
        "press": "PRESS KEY",
        "check": "CHECK",
        "uncheck": "UNCHECK",
        "select_option": "SELECT OPTION",
        "hover": "HOVER",
        "wait_for_selector": "WAIT FOR",
        "wait_for_load_state": "WAIT FOR LOAD STATE",
        "wait_for_url": "WAIT FOR URL",
        "screenshot": "SCREENSHOT",
        "evaluate": "EVALUATE JS",
    }

    def __init__(self, page, test_name):
        self._page = page
        self._test_name = test_name
        self._step_count = 0
        logger.info(f"---------- TEST: {test_name} ----------")

    def _step(self, action, details):
        self._step_count += 1
        logger.info(f"  Step {self._step_count}: {action} | {details}"[:300])

    def cleanup(self, passed):
        status = "PASSED" if passed else "FAILED"
        logger.info(f"---------- {status}: {self._test_name} ({self._step_count} steps) ----------")

    def __getattr__(self, name):
        attr = getattr(self._page, name)
        action = self.LOGGED.get(name)
        if action is None or not callable(attr):
            return attr

        def logged(*args, **kwargs):
            self._step(action, ", ".join(str(a) for a in args))
            return attr(*args, **kwargs)

        return logged


@pytest.fixture(scope="function")
def page(request):
    with sync_playwright() as p:
        test_name = request.node.name
        browser = p.chromium.launch(headless=HEADLESS_MODE)
        context = browser.new_context(
            record_video_dir=str(SESSION_VIDEO_DIR),
            record_video_size={"width": 1280, "height": 720},
        )
        logged_page = PlaywrightLogger(context.new_page(), test_name)
        yield logged_page

        passed = getattr(request.node, "rep_call", None)
        logged_page.cleanup(passed.passed if passed is not None else True)
        time.sleep(1.5)
        context.close()
        browser.close()

        for video in SESSION_VIDEO_DIR.glob("*.webm"):
            if not video.stem.startswith("test_"):
                try:
                    video.rename(SESSION_VIDEO_DIR / f"{test_name}.webm")
                except OSError:
                    pass
                break


@pytest.hookimpl(tryfirst=True, hookwrapper=True)
def pytest_runtest_makereport(item, call):
    outcome = yield
    rep = outcome.get_result()
    setattr(item, f"rep_{rep.when}", rep)
    if rep.when == "call":
        SESSION_TEST_RESULTS.append({
            "name": item.nodeid,
            "status": rep.outcome,
            "passed": rep.passed,
            "duration": rep.duration,
            "error": str(rep.longrepr) if rep.failed else None,
        })


def pytest_sessionfinish(session, exitstatus):
    end_time = datetime.now()
    videos = sorted(SESSION_VIDEO_DIR.glob("*.webm")) if SESSION_VIDEO_DIR.exists() else []
    passed = len([t for t in SESSION_TEST_RESULTS if t["passed"]])
    report = {
        "timestamp": end_time.isoformat(),
        "session_timestamp": SESSION_TIMESTAMP,
        "execution": {
            "success": exitstatus == 0,
            "duration": (end_time - SESSION_START_TIME).total_seconds(),
            "exit_code": int(exitstatus),
        },
        "tests": {
            "total": len(SESSION_TEST_RESULTS),
            "passed": passed,
            "failed": len(SESSION_TEST_RESULTS) - passed,
            "details": SESSION_TEST_RESULTS,
        },
        "evidence": {
            "video_dir": str(SESSION_VIDEO_DIR),
            "video_files": [str(v) for v in videos],
            "log_file": str(SESSION_LOG_FILE),
            "evidence_dir": str(EVIDENCE_DIR),
        },
    }
    with open(SESSION_REPORT_FILE, "w", encoding="utf-8") as f:
        json.dump(report, f, indent=2)
    logger.info("========== TEST SESSION FINISHED ==========")
"#;

/// Render the hook module for an evidence directory.
pub fn render(evidence_dir: &Path) -> String {
    TEMPLATE.replace(EVIDENCE_PLACEHOLDER, &evidence_dir.to_string_lossy())
}

pub fn is_configured(content: &str) -> bool {
    MARKERS.iter().all(|m| content.contains(m))
}

/// Make sure `tests_dir/conftest.py` carries the evidence hooks.
///
/// An existing file with all [`MARKERS`] is left untouched.
pub fn ensure(tests_dir: &Path, evidence_dir: &Path) -> RunnerResult<PathBuf> {
    fs::create_dir_all(tests_dir)?;
    fs::create_dir_all(evidence_dir)?;

    let path = tests_dir.join("conftest.py");
    if let Ok(existing) = fs::read_to_string(&path) {
        if is_configured(&existing) {
            debug!(path = %path.display(), "conftest.py already configured");
            return Ok(path);
        }
    }

    let evidence_dir = evidence_dir
        .canonicalize()
        .unwrap_or_else(|_| evidence_dir.to_path_buf());
    fs::write(&path, render(&evidence_dir))?;
    info!(path = %path.display(), "Generated conftest.py with evidence hooks");
    Ok(path)
}
