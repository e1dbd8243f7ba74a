//! Result files written into temporary directories.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use zip::ZipWriter;
use zip::write::SimpleFileOptions;

pub const ROBOT_OUTPUT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<robot generator="Robot 3.0.2 (Python 2.7.13 on win32)" generated="20170301 10:00:00.000">
<suite source="C:\tests\bank" id="s1" name="Bank">
<suite source="C:\tests\bank\login.robot" id="s1-s1" name="Login">
<test id="s1-s1-t1" name="Valid Login">
<kw name="SeleniumLibrary.Open Browser">
<arguments><arg>http://bank</arg><arg>chrome</arg></arguments>
<status status="PASS" starttime="20170301 10:00:01.000" endtime="20170301 10:00:03.000"/>
</kw>
<kw name="SeleniumLibrary.Page Should Contain">
<arguments><arg>Welcome</arg></arguments>
<status status="PASS" starttime="20170301 10:00:03.000" endtime="20170301 10:00:04.000"/>
</kw>
<status status="PASS" starttime="20170301 10:00:01.000" endtime="20170301 10:00:04.000"/>
</test>
<test id="s1-s1-t2" name="Invalid Login">
<kw name="SeleniumLibrary.Open Browser">
<arguments><arg>http://bank</arg></arguments>
<status status="PASS" starttime="20170301 10:00:05.000" endtime="20170301 10:00:06.000"/>
</kw>
<kw name="SeleniumLibrary.Page Should Contain">
<arguments><arg>Error</arg></arguments>
<status status="FAIL" starttime="20170301 10:00:06.000" endtime="20170301 10:00:07.000"/>
</kw>
<status status="FAIL" starttime="20170301 10:00:05.000" endtime="20170301 10:00:07.000"/>
</test>
<status status="FAIL" starttime="20170301 10:00:00.000" endtime="20170301 10:00:07.000"/>
</suite>
<status status="FAIL" starttime="20170301 10:00:00.000" endtime="20170301 10:00:07.000"/>
</suite>
</robot>
"#;

pub const SELENIUM_REPORT: &str = r#"<html>
<head><title>Test Suite Results</title></head>
<body>
<table id="suiteSummaryTable"><thead><tr><td>Test Suite: Checkout</td></tr></thead>
<tbody><tr><td>Add to cart</td></tr></tbody></table>
<table class="test_case">
<thead><tr><td colspan="4">Test case: Add to cart</td></tr></thead>
<tbody>
<tr><td>open</td><td>/shop</td><td></td><td></td></tr>
<tr><td>type</td><td>id=qty</td><td>2</td><td></td></tr>
<tr><td>click</td><td>id=add</td><td></td><td></td></tr>
</tbody>
</table>
<table class="test_case">
<thead><tr><td colspan="4">Test case: Pay</td></tr></thead>
<tbody>
<tr><td>open</td><td>/cart</td><td></td><td></td></tr>
<tr><td>click</td><td>id=pay</td><td></td><td>Element id=pay not found</td></tr>
</tbody>
</table>
</body>
</html>
"#;

pub const UFT_RESULTS: &str = r#"<?xml version="1.0"?>
<Report ver="2.0" tmZone="Central Europe Standard Time">
<General productName="HP Unified Functional Testing" productVer="12.53"/>
<Doc rID="T1" type="Test" productName="HP Unified Functional Testing">
  <NodeArgs eType="Table" icon="2" nRep="4"><Disp>Data Table</Disp><BtmPane><Path>Default.xlsx</Path></BtmPane></NodeArgs>
  <DIter rID="T2" iterID="1">
    <NodeArgs eType="StartIteration" icon="3" nRep="6" status="Passed"><Disp>Iteration 1</Disp></NodeArgs>
    <Action rID="T3">
      <Step rID="T4">
        <Details>user logged in</Details>
        <Time>03/14/2017 - 14:05:09</Time>
        <NodeArgs eType="User" icon="5" nRep="9" status="Passed"><Disp>Login</Disp></NodeArgs>
      </Step>
      <Summary sTime="03/14/2017 - 14:05:08" eTime="03/14/2017 - 14:05:20"/>
    </Action>
  </DIter>
  <DIter rID="T5" iterID="2">
    <NodeArgs eType="StartIteration" icon="3" nRep="12" status="Failed"><Disp>Iteration 2</Disp></NodeArgs>
    <Action rID="T6">
      <Step rID="T7">
        <Details>button missing</Details>
        <Time>03/14/2017 - 14:06:00</Time>
        <NodeArgs eType="Replay" icon="6" nRep="13" status="Failed"><Disp>Click Pay</Disp></NodeArgs>
      </Step>
      <Summary sTime="03/14/2017 - 14:05:59" eTime="03/14/2017 - 14:06:02"/>
    </Action>
  </DIter>
</Doc>
</Report>
"#;

pub const UFT_ROWS: &[&[&str]] = &[
    &["test", "subject", "suite", "description"],
    &["Login ok", "Bank/Web", "Smoke", "valid credentials"],
    &["Pay bill", "Bank/Web", "Smoke", "payment flow"],
];

pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

/// Robot output plus the log, report and a screenshot.
pub fn write_robot_report(dir: &Path) -> PathBuf {
    write_file(dir, "log.html", "<html>log</html>");
    write_file(dir, "report.html", "<html>report</html>");
    write_file(dir, "selenium-screenshot-1.png", "png");
    write_file(dir, "notes.txt", "not part of the report");
    write_file(dir, "output.xml", ROBOT_OUTPUT)
}

/// UFT run report with its data table workbook.
pub fn write_uft_report(dir: &Path) -> PathBuf {
    write_xlsx(&dir.join("Default.xlsx"), "Global", UFT_ROWS);
    write_file(dir, "Results.xml", UFT_RESULTS)
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn column_letter(index: usize) -> char {
    (b'A' + index as u8) as char
}

/// A single-sheet workbook with inline string cells.
pub fn write_xlsx(path: &Path, sheet: &str, rows: &[&[&str]]) {
    let mut sheet_data = String::new();
    for (r, row) in rows.iter().enumerate() {
        sheet_data.push_str(&format!("<row r=\"{}\">", r + 1));
        for (c, value) in row.iter().enumerate() {
            sheet_data.push_str(&format!(
                "<c r=\"{}{}\" t=\"inlineStr\"><is><t>{}</t></is></c>",
                column_letter(c),
                r + 1,
                xml_escape(value)
            ));
        }
        sheet_data.push_str("</row>");
    }

    let parts = [
        (
            "[Content_Types].xml",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#
                .to_string(),
        ),
        (
            "_rels/.rels",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#
                .to_string(),
        ),
        (
            "xl/workbook.xml",
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="{}" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
                sheet
            ),
        ),
        (
            "xl/_rels/workbook.xml.rels",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#
                .to_string(),
        ),
        (
            "xl/worksheets/sheet1.xml",
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{}</sheetData></worksheet>"#,
                sheet_data
            ),
        ),
    ];

    let mut zip = ZipWriter::new(File::create(path).unwrap());
    for (name, content) in parts {
        zip.start_file(name, SimpleFileOptions::default()).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}
