//! Gnuplot rendering of which pages of a container each class touches.

use crate::errors::DexResult;
use crate::ir::{Collections, FieldId, Header, Idx, Item, MethodId, StringId, TypeId};
use crate::sections::{ColorTable, PAGE_SIZE};
use log::debug;
use regex::Regex;
use std::io::Write;

/// Interface lists are not walked, a fixed span is plotted instead.
const INTERFACES_SPAN: u32 = 8;

#[derive(Debug, Clone)]
pub struct VisualizeOptions {
    pub page_size: u32,
    /// Image file name emitted in the `set output` command.
    pub output_png: String,
    pub title: String,
    /// Only classes whose descriptor matches are plotted.
    pub class_filter: Option<Regex>,
}

impl Default for VisualizeOptions {
    fn default() -> Self {
        Self {
            page_size: PAGE_SIZE,
            output_png: "layout.png".to_string(),
            title: "classes.dex".to_string(),
            class_filter: None,
        }
    }
}

impl VisualizeOptions {
    /// Options named after the `index`-th dex file of an application, the
    /// way multidex files are named (`classes.dex`, `classes2.dex`, ...).
    pub fn for_dex_index(index: usize) -> Self {
        let suffix = if index > 0 {
            (index + 1).to_string()
        } else {
            String::new()
        };
        Self {
            output_png: format!("layout{}.png", suffix),
            title: format!("classes{}.dex", suffix),
            ..Self::default()
        }
    }
}

struct Plotter<'a, W: Write> {
    out: &'a mut W,
    colors: ColorTable,
    cols: &'a Collections,
    page_size: u32,
    records: usize,
}

impl<'a, W: Write> Plotter<'a, W> {
    fn range(&mut self, from: u32, size: u32, class_index: usize) -> DexResult<()> {
        let size_delta = if size > 0 {
            (size - 1) / self.page_size
        } else {
            0
        };
        writeln!(
            self.out,
            "{} {} {} 0 {}",
            from / self.page_size,
            class_index,
            size_delta,
            self.colors.color(from)
        )?;
        self.records += 1;
        Ok(())
    }

    fn item<T: Item>(&mut self, item: &T, class_index: usize) -> DexResult<()> {
        match item.offset() {
            Some(offset) => self.range(offset, item.size(), class_index),
            None => Ok(()),
        }
    }

    fn string_id(&mut self, idx: Idx<StringId>, class_index: usize) -> DexResult<()> {
        let string_id = self.cols.string_ids().get(idx)?;
        self.item(string_id, class_index)?;
        let data = self.cols.string_datas().get(string_id.data)?;
        self.item(data, class_index)
    }

    fn type_id(&mut self, idx: Idx<TypeId>, class_index: usize) -> DexResult<()> {
        let type_id = self.cols.type_ids().get(idx)?;
        self.item(type_id, class_index)
    }

    fn field_id(&mut self, idx: Idx<FieldId>, class_index: usize) -> DexResult<()> {
        let field_id = self.cols.field_ids().get(idx)?;
        self.item(field_id, class_index)?;
        self.type_id(field_id.class, class_index)?;
        self.type_id(field_id.typ, class_index)?;
        self.string_id(field_id.name, class_index)
    }

    fn method_id(&mut self, idx: Idx<MethodId>, class_index: usize) -> DexResult<()> {
        let method_id = self.cols.method_ids().get(idx)?;
        self.item(method_id, class_index)?;
        self.type_id(method_id.class, class_index)?;
        let proto = self.cols.proto_ids().get(method_id.proto)?;
        self.item(proto, class_index)?;
        self.string_id(method_id.name, class_index)
    }
}

/// Writes a gnuplot script plotting, for each class definition, the page
/// ranges of every item the class refers to. Returns the number of plotted
/// records.
pub fn visualize<W: Write>(
    header: &Header,
    out: &mut W,
    options: &VisualizeOptions,
) -> DexResult<usize> {
    writeln!(out, "set terminal png")?;
    writeln!(out, "set output \"{}\"", options.output_png)?;
    writeln!(out, "set title \"{}\"", options.title)?;
    writeln!(out, "set xlabel \"Page offset into dex\"")?;
    writeln!(out, "set ylabel \"ClassDef index\"")?;
    writeln!(
        out,
        "plot '-' using 1:2:3:4:5 with vector nohead linewidth 1 lc variable notitle"
    )?;

    let cols = header.collections();
    let mut plotter = Plotter {
        out,
        colors: ColorTable::new(cols),
        cols,
        page_size: options.page_size.max(1),
        records: 0,
    };

    for (idx, class_def) in cols.class_defs().indexed() {
        if let Some(filter) = &options.class_filter {
            if !filter.is_match(&cols.type_descriptor(class_def.class_type)?) {
                continue;
            }
        }
        let class_index = idx.as_usize();

        plotter.item(class_def, class_index)?;
        plotter.type_id(class_def.class_type, class_index)?;
        if let Some(superclass) = class_def.superclass {
            plotter.type_id(superclass, class_index)?;
        }
        if let Some(interfaces) = class_def.interfaces {
            let offset = cols.type_lists().offset_of(interfaces)?;
            plotter.range(offset, INTERFACES_SPAN, class_index)?;
        }
        if let Some(source_file) = class_def.source_file {
            plotter.string_id(source_file, class_index)?;
        }
        if let Some(annotations) = class_def.annotations {
            plotter.item(cols.annotations_directories().get(annotations)?, class_index)?;
        }
        if let Some(class_data) = class_def.class_data {
            let class_data = cols.class_datas().get(class_data)?;
            plotter.item(class_data, class_index)?;
            for field in class_data.fields() {
                plotter.field_id(field.field, class_index)?;
            }
            for method in class_data.methods() {
                plotter.method_id(method.method, class_index)?;
                if let Some(code) = method.code {
                    plotter.item(cols.code_items().get(code)?, class_index)?;
                }
            }
        }
    }

    debug!("{} layout records plotted", plotter.records);
    Ok(plotter.records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ClassDef, ItemInfo};

    fn header() -> Header {
        let mut header = Header::default();
        let cols = header.collections_mut();
        let foo = cols.add_type("LFoo;");
        let bar = cols.add_type("LBar;");
        *cols.type_ids_mut().get_mut(foo).unwrap().info_mut() = ItemInfo::new(0x74, 4);
        cols.type_ids_mut().set_offset(Some(0x74));
        cols.class_defs_mut().set_offset(Some(0x1000));
        cols.add_class_def(ClassDef::new(foo, 1)).unwrap();
        cols.add_class_def(ClassDef::new(bar, 1)).unwrap();
        cols.class_defs_mut()
            .iter_mut()
            .enumerate()
            .for_each(|(i, c)| c.set_offset(0x1000 + 32 * i as u32));
        header
    }

    #[test]
    fn preamble_and_records() {
        let header = header();
        let mut out = Vec::new();
        let records = visualize(&header, &mut out, &VisualizeOptions::for_dex_index(1)).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "set terminal png");
        assert_eq!(lines[1], "set output \"layout2.png\"");
        assert_eq!(lines[2], "set title \"classes2.dex\"");
        assert!(lines[5].starts_with("plot '-'"));
        // class def plus its type id for Foo, the class def alone for Bar
        assert_eq!(records, 3);
        assert_eq!(lines[6], "1 0 0 0 0");
        assert_eq!(lines[7], "0 0 0 0 0");
        assert_eq!(lines[8], "1 1 0 0 1");
    }

    #[test]
    fn filtered() {
        let header = header();
        let options = VisualizeOptions {
            class_filter: Some(Regex::new("^LBar;$").unwrap()),
            ..VisualizeOptions::default()
        };
        let mut out = Vec::new();
        assert_eq!(visualize(&header, &mut out, &options).unwrap(), 1);
    }
}
