use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
};

use tracing::instrument;

use crate::{geometry::Quad, Error, OrientedBox, Result};

/// Leading vertex fields on every annotation line: `x0,y0,x1,y1,x2,y2,x3,y3`.
const QUAD_FIELDS: usize = 8;

/// Parses the quad at the start of an annotation line. Fields after the 8th are ignored.
///
/// On failure returns the reason the line is malformed.
pub fn parse_annotation_line(line: &str) -> std::result::Result<Quad, String> {
    let mut coords = [0i32; QUAD_FIELDS];
    let mut fields = line.split(',');
    for (index, coord) in coords.iter_mut().enumerate() {
        let field = fields.next().ok_or_else(|| {
            format!("expected at least {QUAD_FIELDS} comma-separated fields, found {index}")
        })?;
        let value = field
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("field {index} ({field:?}) is not a number"))?;
        if !value.is_finite() {
            return Err(format!("field {index} ({field:?}) is not finite"));
        }
        // truncates toward zero
        *coord = value as i32;
    }

    let [x0, y0, x1, y1, x2, y2, x3, y3] = coords;
    Ok(Quad::new([x0, x1, x2, x3], [y0, y1, y2, y3]))
}

/// Reads one oriented box per non-empty line, in line order.
///
/// Any malformed line fails the whole source; no partial result is returned.
pub fn read_ground_truth<R: BufRead>(reader: R) -> Result<Vec<OrientedBox>> {
    let mut boxes = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| Error::io(None, source))?;
        let line = if index == 0 {
            line.strip_prefix('\u{feff}').unwrap_or(&line)
        } else {
            &line
        };
        if line.trim().is_empty() {
            continue;
        }

        let quad = parse_annotation_line(line).map_err(|reason| Error::MalformedAnnotationLine {
            path: None,
            line: index + 1,
            reason,
        })?;
        boxes.push(quad.to_oriented_box());
    }
    Ok(boxes)
}

#[instrument(level = "debug")]
pub fn read_ground_truth_file(path: &Path) -> Result<Vec<OrientedBox>> {
    let file = File::open(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => Error::MissingAnnotationFile {
            path: path.to_path_buf(),
        },
        _ => Error::io(Some(path.to_path_buf()), source),
    })?;
    let boxes = read_ground_truth(BufReader::new(file)).map_err(|err| err.with_path(path))?;
    log::debug!("Read {} boxes from {}", boxes.len(), path.display());
    Ok(boxes)
}
