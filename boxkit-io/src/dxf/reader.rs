//! 组码对读取器，把 DXF 文本回读为实体摘要，供测试与命令行日志使用。

use glam::DVec2;

use crate::IoError;

/// 单个实体的摘要。未出现的字段保持默认值。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntitySummary {
    pub kind: String,
    pub layer: String,
    /// 组码 10/20：LINE 起点、CIRCLE/ARC 圆心、TEXT 插入点。
    pub point: Option<DVec2>,
    /// 组码 11/21：LINE 终点、TEXT 对齐点。
    pub second_point: Option<DVec2>,
    pub radius: Option<f64>,
    pub start_angle: Option<f64>,
    pub end_angle: Option<f64>,
    /// LWPOLYLINE 顶点，附带 bulge。
    pub vertices: Vec<(DVec2, f64)>,
    pub closed: bool,
    pub text: Option<String>,
    pub height: Option<f64>,
    pub halign: Option<i32>,
    pub lineweight: Option<i32>,
}

impl EntitySummary {
    fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            layer: "0".to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DxfSummary {
    pub version: Option<String>,
    pub ext_min: Option<DVec2>,
    pub ext_max: Option<DVec2>,
    pub entities: Vec<EntitySummary>,
}

impl DxfSummary {
    pub fn count(&self, kind: &str) -> usize {
        self.entities.iter().filter(|e| e.kind == kind).count()
    }

    pub fn of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a EntitySummary> + 'a {
        self.entities.iter().filter(move |e| e.kind == kind)
    }
}

/// 一个组码对，附带组码所在的行号。
#[derive(Debug, Clone, PartialEq)]
struct GroupPair {
    code: i32,
    value: String,
    line: usize,
}

impl GroupPair {
    fn is_marker(&self, name: &str) -> bool {
        self.code == 0 && self.value == name
    }

    fn invalid(&self, owner: &str, expected: &str) -> IoError {
        IoError::InvalidDocument(format!(
            "第 {} 行：{owner} 的组码 {} 期望{expected}，实际为 \"{}\"",
            self.line,
            self.code,
            self.value.trim()
        ))
    }

    fn number(&self, owner: &str) -> Result<f64, IoError> {
        self.value.trim().parse().map_err(|_| self.invalid(owner, "实数"))
    }

    fn integer(&self, owner: &str) -> Result<i32, IoError> {
        self.value.trim().parse().map_err(|_| self.invalid(owner, "整数"))
    }
}

/// 逐对读取组码，可预看一对。
struct PairStream<'a> {
    lines: std::iter::Enumerate<std::str::Lines<'a>>,
    peeked: Option<GroupPair>,
}

impl<'a> PairStream<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            lines: source.lines().enumerate(),
            peeked: None,
        }
    }

    fn read_pair(&mut self) -> Result<Option<GroupPair>, IoError> {
        let Some((index, code_line)) = self.lines.next() else {
            return Ok(None);
        };
        let line = index + 1;
        let code = code_line.trim().parse::<i32>().map_err(|_| {
            IoError::InvalidDocument(format!("第 {line} 行：组码 \"{}\" 不是整数", code_line.trim()))
        })?;
        let Some((_, value)) = self.lines.next() else {
            return Err(IoError::InvalidDocument(format!(
                "第 {line} 行：组码 {code} 之后缺少值行"
            )));
        };
        Ok(Some(GroupPair {
            code,
            value: value.trim_end_matches('\r').to_string(),
            line,
        }))
    }

    fn next(&mut self) -> Result<Option<GroupPair>, IoError> {
        match self.peeked.take() {
            Some(pair) => Ok(Some(pair)),
            None => self.read_pair(),
        }
    }

    /// 读取下一对；输入结束时报告 `context` 未结束。
    fn expect(&mut self, context: &str) -> Result<GroupPair, IoError> {
        self.next()?
            .ok_or_else(|| IoError::InvalidDocument(format!("{context} 未结束，输入已到末尾")))
    }

    /// 下一对是否为组码 0（新实体或段结束）。不消耗。
    fn at_boundary(&mut self) -> Result<bool, IoError> {
        if self.peeked.is_none() {
            self.peeked = self.read_pair()?;
        }
        Ok(self.peeked.as_ref().is_none_or(|pair| pair.code == 0))
    }
}

/// 读取 HEADER 中的版本与范围，以及 ENTITIES 中的全部实体。其他段跳过。
pub fn summarize(source: &str) -> Result<DxfSummary, IoError> {
    let mut stream = PairStream::new(source);
    let mut summary = DxfSummary::default();
    while let Some(pair) = stream.next()? {
        if pair.is_marker("EOF") {
            return Ok(summary);
        }
        if !pair.is_marker("SECTION") {
            return Err(pair.invalid("文件顶层", " 0/SECTION 或 0/EOF"));
        }
        let name = stream.expect("SECTION")?;
        if name.code != 2 {
            return Err(name.invalid("SECTION", "段名（组码 2）"));
        }
        match name.value.as_str() {
            "HEADER" => read_header(&mut stream, &mut summary)?,
            "ENTITIES" => read_entities(&mut stream, &mut summary)?,
            _ => while !stream.expect(&name.value)?.is_marker("ENDSEC") {},
        }
    }
    Err(IoError::InvalidDocument("缺少 EOF 标记".into()))
}

fn read_header(stream: &mut PairStream<'_>, summary: &mut DxfSummary) -> Result<(), IoError> {
    let mut variable = String::new();
    let mut x = 0.0;
    loop {
        let pair = stream.expect("HEADER")?;
        match pair.code {
            0 if pair.value == "ENDSEC" => return Ok(()),
            9 => variable = pair.value,
            1 if variable == "$ACADVER" => summary.version = Some(pair.value),
            10 => x = pair.number(&variable)?,
            20 => {
                let point = DVec2::new(x, pair.number(&variable)?);
                match variable.as_str() {
                    "$EXTMIN" => summary.ext_min = Some(point),
                    "$EXTMAX" => summary.ext_max = Some(point),
                    _ => {}
                }
            }
            _ => {}
        }
    }
}

fn read_entities(stream: &mut PairStream<'_>, summary: &mut DxfSummary) -> Result<(), IoError> {
    loop {
        let pair = stream.expect("ENTITIES")?;
        if pair.code != 0 {
            return Err(pair.invalid("ENTITIES", "实体类型（组码 0）"));
        }
        if pair.value == "ENDSEC" {
            return Ok(());
        }
        let entity = read_entity(stream, &pair.value)?;
        summary.entities.push(entity);
    }
}

fn read_entity(stream: &mut PairStream<'_>, kind: &str) -> Result<EntitySummary, IoError> {
    let mut entity = EntitySummary::new(kind);
    let polyline = kind == "LWPOLYLINE";
    let (mut x, mut x2) = (0.0, 0.0);
    while !stream.at_boundary()? {
        let pair = stream.expect(kind)?;
        match pair.code {
            1 => entity.text = Some(pair.value),
            8 => entity.layer = pair.value.trim().to_string(),
            10 => x = pair.number(kind)?,
            20 if polyline => entity.vertices.push((DVec2::new(x, pair.number(kind)?), 0.0)),
            20 => entity.point = Some(DVec2::new(x, pair.number(kind)?)),
            11 => x2 = pair.number(kind)?,
            21 => entity.second_point = Some(DVec2::new(x2, pair.number(kind)?)),
            40 if kind == "TEXT" => entity.height = Some(pair.number(kind)?),
            40 => entity.radius = Some(pair.number(kind)?),
            42 => {
                let bulge = pair.number(kind)?;
                let Some(vertex) = entity.vertices.last_mut() else {
                    return Err(pair.invalid(kind, "出现在顶点之后"));
                };
                vertex.1 = bulge;
            }
            50 => entity.start_angle = Some(pair.number(kind)?),
            51 => entity.end_angle = Some(pair.number(kind)?),
            70 if polyline => entity.closed = pair.integer(kind)? & 1 == 1,
            72 => entity.halign = Some(pair.integer(kind)?),
            370 => entity.lineweight = Some(pair.integer(kind)?),
            _ => {}
        }
    }
    Ok(entity)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "  0\r\nSECTION\r\n  2\r\nHEADER\r\n  9\r\n$ACADVER\r\n  1\r\nAC1015\r\n  9\r\n$EXTMAX\r\n 10\r\n30.0\r\n 20\r\n40.0\r\n 30\r\n0.0\r\n  0\r\nENDSEC\r\n  0\r\nSECTION\r\n  2\r\nENTITIES\r\n  0\r\nLWPOLYLINE\r\n  8\r\n0\r\n370\r\n10\r\n 90\r\n2\r\n 70\r\n1\r\n 10\r\n0.0\r\n 20\r\n0.0\r\n 42\r\n1.0\r\n 10\r\n10.0\r\n 20\r\n0.0\r\n  0\r\nTEXT\r\n 10\r\n1.0\r\n 20\r\n2.0\r\n 40\r\n3.5\r\n  1\r\nLid\r\n  0\r\nENDSEC\r\n  0\r\nEOF\r\n";

    #[test]
    fn summary_reads_header_and_entities() {
        let summary = summarize(SAMPLE).expect("valid sample");
        assert_eq!(summary.version.as_deref(), Some("AC1015"));
        assert_eq!(summary.ext_max, Some(DVec2::new(30.0, 40.0)));
        assert_eq!(summary.ext_min, None);
        assert_eq!(summary.entities.len(), 2);

        let poly = &summary.entities[0];
        assert!(poly.closed);
        assert_eq!(poly.lineweight, Some(10));
        assert_eq!(poly.vertices, vec![(DVec2::ZERO, 1.0), (DVec2::new(10.0, 0.0), 0.0)]);

        let text = &summary.entities[1];
        assert_eq!(text.text.as_deref(), Some("Lid"));
        assert_eq!(text.height, Some(3.5));
        assert_eq!(text.point, Some(DVec2::new(1.0, 2.0)));
        assert_eq!(summary.count("TEXT"), 1);
    }

    fn error_text(source: &str) -> String {
        match summarize(source) {
            Err(IoError::InvalidDocument(message)) => message,
            other => panic!("expected invalid document, got {other:?}"),
        }
    }

    #[test]
    fn bad_values_name_line_and_group_code() {
        let source = "  0\nSECTION\n  2\nENTITIES\n  0\nCIRCLE\n 10\n1.0\n 20\n2.0\n 40\nwide\n  0\nENDSEC\n  0\nEOF\n";
        let message = error_text(source);
        assert!(message.contains("第 11 行"), "{message}");
        assert!(message.contains("CIRCLE 的组码 40"), "{message}");
        assert!(message.contains("wide"), "{message}");

        let message = error_text("  0\nSECTION\n  2\nENTITIES\n  0\n");
        assert!(message.contains("第 5 行"), "{message}");
    }

    #[test]
    fn unknown_sections_are_skipped() {
        let source = "  0\nSECTION\n  2\nTABLES\n  0\nTABLE\n  2\nLAYER\n  0\nENDSEC\n  0\nSECTION\n  2\nENTITIES\n  0\nLINE\n 10\n0.0\n 20\n0.0\n 11\n3.0\n 21\n4.0\n  0\nENDSEC\n  0\nEOF\n";
        let summary = summarize(source).expect("valid document");
        assert_eq!(summary.count("LINE"), 1);
        let line = &summary.entities[0];
        assert_eq!(line.point, Some(DVec2::ZERO));
        assert_eq!(line.second_point, Some(DVec2::new(3.0, 4.0)));
        assert_eq!(line.layer, "0");
    }

    #[test]
    fn malformed_input_is_reported() {
        assert!(matches!(
            summarize("  0\r\nSECTION\r\n  2\r\n"),
            Err(IoError::InvalidDocument(_))
        ));
        assert!(matches!(summarize("abc\r\nLINE\r\n"), Err(IoError::InvalidDocument(_))));
        assert!(matches!(
            summarize("  0\r\nSECTION\r\n  2\r\nENTITIES\r\n"),
            Err(IoError::InvalidDocument(_))
        ));
    }
}
